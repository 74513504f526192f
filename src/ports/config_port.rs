//! Configuration access port.

/// Section/key lookup over desk settings. Values come back as raw strings;
/// parsing and range validation happen in `domain::config_validation`, so a
/// malformed number is reported instead of replaced by a default.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
}
