use std::env::VarError;

use anyhow::{Result, bail};
use rand::Rng;

/// Get an env var as a String; decoding failures are reported as
/// errors.
pub fn getenv(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(s) => Ok(Some(s)),
        Err(e) => match e {
            VarError::NotPresent => Ok(None),
            VarError::NotUnicode(_) => bail!("{name:?} env var is not unicode"),
        }
    }
}

/// Like getenv, but falling back to `fallbackvalue`; an error if the
/// var is missing and there is no fallback.
pub fn getenv_or(name: &str, fallbackvalue: Option<&str>) -> Result<String> {
    match getenv(name)? {
        Some(s) => Ok(s),
        None => match fallbackvalue {
            Some(v) => Ok(v.to_string()),
            None => bail!("{name:?} env var is missing and \
                           no default provided"),
        }
    }
}

/// A random integer in `min..=max` (the bounds may come in either
/// order).
pub fn random_inclusive(min: i64, max: i64) -> i64 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    rand::thread_rng().gen_range(lo..=hi)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_getenv_or() {
        let name = "AMMO_UTIL_TEST_SURELY_UNSET";
        assert_eq!(getenv(name).unwrap(), None);
        assert_eq!(getenv_or(name, Some("x")).unwrap(), "x");
        assert!(getenv_or(name, None).is_err());
    }

    #[test]
    fn t_random_inclusive() {
        for _ in 0..200 {
            let v = random_inclusive(3, 5);
            assert!((3..=5).contains(&v));
            let v = random_inclusive(2, -2);
            assert!((-2..=2).contains(&v));
        }
        assert_eq!(random_inclusive(7, 7), 7);
    }
}
