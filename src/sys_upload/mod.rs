pub mod core;
pub mod handlers;

#[cfg(test)]
pub mod test_support;
