use strum::{EnumIs, EnumTryAs};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, EnumTryAs, Error)]
pub enum Error {
    /// A block needs at least one expression to take its value from.
    #[error(
        "A block must contain at least one expression. Its value and type are those of its last expression."
    )]
    EmptyBlock,
}
