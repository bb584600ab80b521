//! Cross-crate tests for the jit68 translator.

#[cfg(test)]
mod backend;
#[cfg(test)]
mod core;
#[cfg(test)]
mod exec;
