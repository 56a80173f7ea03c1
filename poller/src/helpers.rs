use std::{
    env,
    fmt::{Debug, Display},
    str::FromStr,
};

use tracing::warn;

use crate::error::ConfigError;

pub fn get_env_var_or_default<T>(var_name: &str, default: T) -> T
where
    T: Display + FromStr,
    <T as FromStr>::Err: Display,
{
    match env::var(var_name) {
        Ok(val) => match T::from_str(val.trim()) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(
                    var = var_name,
                    value = %val,
                    %default,
                    %error,
                    "can't parse env var, using default"
                );
                default
            }
        },
        Err(error) => {
            warn!(var = var_name, %default, %error, "env var not set, using default");
            default
        }
    }
}

pub fn get_required_env_var<T>(var_name: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: Debug,
{
    let val = env::var(var_name).map_err(|_| ConfigError::Missing(var_name))?;
    T::from_str(val.trim()).map_err(|_| ConfigError::Invalid {
        name: var_name,
        value: val,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // each test owns its variable names, tests run in parallel

    #[test]
    fn falls_back_when_unset() {
        assert_eq!(get_env_var_or_default("QUOTE_POLLER_TEST_UNSET", 42u64), 42);
    }

    #[test]
    fn falls_back_when_unparseable() {
        env::set_var("QUOTE_POLLER_TEST_GARBAGE", "many");
        assert_eq!(get_env_var_or_default("QUOTE_POLLER_TEST_GARBAGE", 7u32), 7);
    }

    #[test]
    fn parses_set_values() {
        env::set_var("QUOTE_POLLER_TEST_SET", " 250 ");
        assert_eq!(get_env_var_or_default("QUOTE_POLLER_TEST_SET", 1usize), 250);
    }

    #[test]
    fn required_vars_report_missing_and_invalid() {
        assert!(matches!(
            get_required_env_var::<i64>("QUOTE_POLLER_TEST_REQUIRED_UNSET"),
            Err(ConfigError::Missing("QUOTE_POLLER_TEST_REQUIRED_UNSET"))
        ));

        env::set_var("QUOTE_POLLER_TEST_REQUIRED_BAD", "seven");
        assert!(matches!(
            get_required_env_var::<i64>("QUOTE_POLLER_TEST_REQUIRED_BAD"),
            Err(ConfigError::Invalid { value, .. }) if value == "seven"
        ));
    }
}
