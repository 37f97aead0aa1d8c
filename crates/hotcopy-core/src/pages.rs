//! Page budgets and progress counters
//!
//! A backup step copies at most a [`StepSize`] worth of pages. The engine's
//! own convention of "negative means everything" is only accepted through
//! [`StepSize::from_engine_convention`]; the typed API spells it
//! [`StepSize::All`].
//!
//! # Example
//!
//! ```rust
//! use hotcopy_core::pages::StepSize;
//!
//! let step = StepSize::pages(100).expect("100 is valid");
//! assert_eq!(step.as_engine_arg(), 100);
//!
//! assert!(StepSize::pages(0).is_none());
//! assert_eq!(StepSize::from_engine_convention(-1), Ok(StepSize::All));
//! ```

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum number of pages one step may copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum StepSize {
    /// Copy up to this many pages.
    Pages(NonZeroU32),
    /// Copy every remaining page in a single call.
    All,
}

impl StepSize {
    /// Create a bounded step size. Returns `None` for zero.
    pub const fn pages(count: u32) -> Option<Self> {
        match NonZeroU32::new(count) {
            Some(count) => Some(Self::Pages(count)),
            None => None,
        }
    }

    /// Interpret an engine-style page argument.
    ///
    /// Negative values mean "all remaining pages", zero is rejected, and
    /// positive values are a page bound.
    pub fn from_engine_convention(count: i64) -> Result<Self, StepSizeError> {
        if count < 0 {
            return Ok(Self::All);
        }
        let count = u32::try_from(count).map_err(|_| StepSizeError::TooLarge { count })?;
        Self::pages(count).ok_or(StepSizeError::Zero)
    }

    /// The argument to hand to the engine's step primitive.
    pub fn as_engine_arg(self) -> i32 {
        match self {
            Self::Pages(count) => i32::try_from(count.get()).unwrap_or(i32::MAX),
            Self::All => -1,
        }
    }

    /// Page bound for this step, `None` meaning unbounded.
    pub fn limit(self) -> Option<u32> {
        match self {
            Self::Pages(count) => Some(count.get()),
            Self::All => None,
        }
    }
}

impl Default for StepSize {
    fn default() -> Self {
        // 100 pages
        Self::Pages(NonZeroU32::MIN.saturating_add(99))
    }
}

impl TryFrom<i64> for StepSize {
    type Error = StepSizeError;

    fn try_from(count: i64) -> Result<Self, Self::Error> {
        Self::from_engine_convention(count)
    }
}

impl From<StepSize> for i64 {
    fn from(step: StepSize) -> Self {
        match step {
            StepSize::Pages(count) => i64::from(count.get()),
            StepSize::All => -1,
        }
    }
}

impl FromStr for StepSize {
    type Err = StepSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let count = trimmed
            .parse::<i64>()
            .map_err(|_| StepSizeError::Unparseable {
                input: trimmed.to_string(),
            })?;
        Self::from_engine_convention(count)
    }
}

impl fmt::Display for StepSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pages(count) => write!(f, "{}", count),
            Self::All => write!(f, "all"),
        }
    }
}

/// Errors that can occur when creating a StepSize
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepSizeError {
    #[error("Step size must copy at least one page")]
    Zero,

    #[error("Step size {count} exceeds the engine limit")]
    TooLarge { count: i64 },

    #[error("Invalid step size '{input}': expected a page count or 'all'")]
    Unparseable { input: String },
}

/// Page counters observed right after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Pages not yet copied.
    pub remaining: u32,
    /// Total pages in the source.
    pub page_count: u32,
}

impl Progress {
    pub const fn new(remaining: u32, page_count: u32) -> Self {
        Self {
            remaining,
            page_count,
        }
    }

    /// Pages copied so far.
    pub const fn copied(&self) -> u32 {
        self.page_count.saturating_sub(self.remaining)
    }

    pub const fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Completion in percent. An empty source counts as complete.
    pub fn percent(&self) -> f64 {
        if self.page_count == 0 {
            return 100.0;
        }
        f64::from(self.copied()) * 100.0 / f64::from(self.page_count)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} pages ({:.1}%)",
            self.copied(),
            self.page_count,
            self.percent()
        )
    }
}
