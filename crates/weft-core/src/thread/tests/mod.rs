#[cfg(test)]
mod pool_tests;
