//! Cross-crate integration tests

#[cfg(test)]
mod eq_integration;
