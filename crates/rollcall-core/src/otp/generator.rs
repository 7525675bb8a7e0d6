//! CodeGenerator - ワンタイムコードの生成

use rand::Rng;
use rand::rngs::OsRng;

/// Number of digits in every issued code.
pub const CODE_LENGTH: usize = 6;

pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Uniform 6-digit codes from the OS CSPRNG.
///
/// Drawn from `100000..=999999`, so there is never a leading zero to lose.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRngCodeGenerator;

impl CodeGenerator for OsRngCodeGenerator {
    fn generate(&self) -> String {
        let n: u32 = 100_000 + OsRng.gen_range(0..900_000);
        n.to_string()
    }
}
