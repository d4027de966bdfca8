use anyhow::anyhow;
use std::env;
use std::fmt::Display;
use std::sync::LazyLock;

pub mod parsing;
pub mod pitch;
pub mod score;
pub mod test_helpers;

/// Whether to emit ANSI color sequences. Honors the `NO_COLOR` convention.
pub static USE_COLOR: LazyLock<bool> = LazyLock::new(|| env::var_os("NO_COLOR").is_none());

pub fn to_anyhow<E: Display>(e: E) -> anyhow::Error {
    anyhow!("{e}")
}
