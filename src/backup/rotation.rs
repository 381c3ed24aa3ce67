//! Rolling rotation of numbered backup generations.
//!
//! Generation 1 is the unsuffixed base file, generation `k >= 2` lives next to
//! it as `<base>.bakKK` with a two digit, zero padded `KK`. Rotating ages every
//! existing generation by one step so the base path is free for a new backup.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use function_name::named;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub static BAK_EXT: &str = "bak";
pub const MIN_RETENTION_COUNT: usize = 2;
pub const MAX_RETENTION_COUNT: usize = 99;

/// Primitive used to move one generation into the next slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveStrategy {
    /// Atomic on the same filesystem, fails across devices or on locked targets
    Rename,
    /// Always possible, but leaves the source in place
    Copy,
}

/// Order in which strategies are attempted for every slot
pub static FALLBACK_CHAIN: [MoveStrategy; 2] = [MoveStrategy::Rename, MoveStrategy::Copy];

impl MoveStrategy {
    pub fn apply(&self, from: &Path, to: &Path) -> Result<()> {
        match self {
            MoveStrategy::Rename => std::fs::rename(from, to)?,
            MoveStrategy::Copy => {
                std::fs::copy(from, to)?;
            }
        }
        Ok(())
    }
}

/// Moves `from` onto `to`, trying each strategy of `chain` in order.
///
/// Returns the strategy that succeeded. When all of them fail the errors of
/// every attempt are returned together.
pub fn move_or_copy(from: &Path, to: &Path, chain: &[MoveStrategy]) -> Result<MoveStrategy> {
    let mut errors = Vec::with_capacity(chain.len());
    for strategy in chain {
        match strategy.apply(from, to) {
            Ok(()) => return Ok(*strategy),
            Err(e) => {
                tracing::warn!("{:?} {:?} -> {:?} failed: {}", strategy, from, to, e);
                errors.push(e);
            }
        }
    }

    if errors.is_empty() {
        return Err(Error::from(std::io::Error::other("empty move strategy chain")));
    }
    Err(errors.into())
}

pub fn generation_path<P: AsRef<Path>>(base: P, generation: usize) -> PathBuf {
    let base = base.as_ref();
    if generation <= 1 {
        return base.to_path_buf();
    }

    let mut name = OsString::from(base.as_os_str());
    name.push(format!(".{}{:02}", BAK_EXT, generation));
    PathBuf::from(name)
}

/// Inverse of [`generation_path`] on file names: which generation of
/// `base_name` is `file_name`, if any.
pub fn generation_number(base_name: &str, file_name: &str) -> Option<usize> {
    if file_name == base_name {
        return Some(1);
    }

    let digits = file_name
        .strip_prefix(base_name)?
        .strip_prefix('.')?
        .strip_prefix(BAK_EXT)?;
    if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok().filter(|g| *g >= MIN_RETENTION_COUNT)
}

pub fn validate_retention_count(retention: usize) -> Result<()> {
    if !(MIN_RETENTION_COUNT..=MAX_RETENTION_COUNT).contains(&retention) {
        return Err(Error::InvalidRetentionCount(retention));
    }
    Ok(())
}

/// Ages the generation chain of `base` by one step.
///
/// Walks slots from `retention - 1` down to the base file, moving every
/// existing generation `cp` onto `cp + 1` with [`FALLBACK_CHAIN`]. Missing
/// generations are skipped. Whatever sat in generation `retention` is
/// overwritten. Stops at the first slot no strategy can move; generations
/// already moved stay moved.
#[named]
pub fn rotate<P: AsRef<Path>>(base: P, retention: usize) -> Result<()> {
    validate_retention_count(retention).add_fn_name(function_path!())?;
    let base = base.as_ref();

    for cp in (1..retention).rev() {
        let from = generation_path(base, cp);
        if !from.is_file() {
            tracing::trace!("Skipping missing generation {:?}", from);
            continue;
        }

        let to = generation_path(base, cp + 1);
        let strategy = move_or_copy(&from, &to, &FALLBACK_CHAIN).add_fn_name(function_path!())?;
        tracing::debug!("Rotated {:?} -> {:?} using {:?}", from, to, strategy);
    }

    Ok(())
}
