use std::{fmt::Write, path::Path, str::FromStr};

use anyhow::{Context, bail};
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use toml::Value;

use crate::Config;

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();

    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read configuration from {}", path.display()))?;

    let config = from_str(&content)?;
    log::debug!("Loaded configuration from {}", path.display());

    Ok(config)
}

fn from_str(content: &str) -> anyhow::Result<Config> {
    let mut raw_config: Value = toml::from_str(content)?;
    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    Ok(Config::deserialize(raw_config)?)
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();

                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]")?,
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;

    use super::*;

    #[test]
    fn expands_environment_variables() {
        let config = from_str(indoc! {r#"
            [rate_limit.redis]
            namespace = "{{ env.PATH }}"
        "#})
        .unwrap();

        assert_eq!(config.rate_limit.redis.namespace, std::env::var("PATH").unwrap());
    }

    #[test]
    fn missing_environment_variable_names_the_path() {
        let error = from_str(indoc! {r#"
            [rate_limit.redis]
            url = "{{ env.TURNSTILE_LOADER_TEST_DEFINITELY_UNSET }}"
        "#})
        .unwrap_err();

        assert!(
            error
                .to_string()
                .contains("Failed to expand dynamic string at path 'rate_limit.redis.url'"),
            "{error}"
        );
    }

    #[test]
    fn plain_strings_are_untouched() {
        let config = from_str(indoc! {r#"
            [rate_limit]
            type = " Memory "
        "#})
        .unwrap();

        assert_eq!(config.rate_limit.kind, " Memory ");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();

        file.write_all(
            indoc! {r#"
                [rate_limit]
                requests_per_second = 25.0
            "#}
            .as_bytes(),
        )
        .unwrap();

        let config = load(file.path()).unwrap();

        assert_eq!(config.rate_limit.effective_rate(), 25.0);
    }

    #[test]
    fn missing_file() {
        let error = load("/nonexistent/turnstile.toml").unwrap_err();

        assert!(error.to_string().contains("Failed to read configuration"), "{error}");
    }
}
