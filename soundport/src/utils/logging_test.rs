#[cfg(test)]
mod tests {
    use super::super::logging::init_logging;

    #[test]
    fn test_logging_initialization() {
        init_logging();
    }

    #[test]
    fn test_logging_initialization_is_repeatable() {
        // A second global subscriber must not panic
        init_logging();
        init_logging();
        tracing::debug!("still logging");
    }
}
