//! OTP - アクセス前に使うワンタイムコード
//!
//! メンバーの mark/verify サイクルとは独立した、キー単位の短命なコード置き場。

pub mod generator;
pub mod store;

pub use self::generator::{CODE_LENGTH, CodeGenerator, OsRngCodeGenerator};
pub use self::store::{DEFAULT_TTL_MINUTES, OneTimeCodeStore};
