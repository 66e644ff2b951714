//! # Shared Data Structures (report engine ↔ collaborators)
//!
//! Plain value types shared between the report engine and the crates that
//! feed it or read from it (sensor readers, codecs, exporters). Everything
//! here is `Copy`, allocation-free and usable from `no_std` code.
//!
//! ## Key Types
//!
//! - [`ModuleId`], [`PathId`], [`SourceNodeId`] - compact identifiers handed
//!   out by one monotonically increasing counter
//! - [`SensorValues`] - profiler hits plus the five CPU-time channels
//! - [`ReferenceKind`] - which reference map / channel a call edge lands in
//!
//! ## Units
//!
//! All CPU times are signed microseconds ([`MicroSeconds`]). Signed so that
//! the difference of two reports is representable without a second type.

#![no_std]

use core::fmt;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// CPU time in microseconds.
pub type MicroSeconds = i64;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub u32);

        impl $name {
            /// Raw counter value.
            #[must_use]
            pub fn get(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a module (the project itself, the language runtime, or
    /// one external dependency).
    ModuleId,
    "module#"
);

define_id!(
    /// Identifier of a file path inside a module.
    PathId,
    "path#"
);

define_id!(
    /// Identifier of a source node (function, method, scope) inside a path.
    ///
    /// Ids share one counter with modules and paths, so a `SourceNodeId` is
    /// unique across the whole index it came from.
    SourceNodeId,
    "node#"
);

// ============================================================================
// Reference kinds
// ============================================================================

/// Classification of a call edge from the caller's point of view.
///
/// Decides both the reference map an edge is recorded in and the CPU-time
/// channel of the caller that the edge's aggregated time is added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ReferenceKind {
    /// Callee lives in the same report as the caller
    Intern,
    /// Callee lives in another report (another module, or the project)
    Extern,
    /// Callee is a language/runtime-internal frame
    LangInternal,
}

impl ReferenceKind {
    /// All kinds, in serialization order.
    pub const ALL: [ReferenceKind; 3] =
        [ReferenceKind::Intern, ReferenceKind::Extern, ReferenceKind::LangInternal];
}

// ============================================================================
// Sensor values
// ============================================================================

#[cfg(feature = "serde")]
#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if passes by reference
fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Profiler hits and CPU-time channels attached to one source node (or one
/// reference edge, or one aggregate).
///
/// Absent fields deserialize as zero and zero fields are skipped when
/// serializing, so `{}` is the empty value.
///
/// **Channels**:
/// - `self_cpu_time`: time spent directly in the node
/// - `aggregated_cpu_time`: self time plus everything called, counted once
///   per outermost occurrence
/// - `intern_cpu_time` / `extern_cpu_time` / `lang_internal_cpu_time`: time
///   spent in callees, split by [`ReferenceKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SensorValues {
    #[cfg_attr(feature = "serde", serde(rename = "profilerHits", skip_serializing_if = "is_zero"))]
    pub profiler_hits: i64,

    #[cfg_attr(feature = "serde", serde(rename = "selfCPUTime", skip_serializing_if = "is_zero"))]
    pub self_cpu_time: MicroSeconds,

    #[cfg_attr(
        feature = "serde",
        serde(rename = "aggregatedCPUTime", skip_serializing_if = "is_zero")
    )]
    pub aggregated_cpu_time: MicroSeconds,

    #[cfg_attr(feature = "serde", serde(rename = "internCPUTime", skip_serializing_if = "is_zero"))]
    pub intern_cpu_time: MicroSeconds,

    #[cfg_attr(feature = "serde", serde(rename = "externCPUTime", skip_serializing_if = "is_zero"))]
    pub extern_cpu_time: MicroSeconds,

    #[cfg_attr(
        feature = "serde",
        serde(rename = "langInternalCPUTime", skip_serializing_if = "is_zero")
    )]
    pub lang_internal_cpu_time: MicroSeconds,
}

impl SensorValues {
    /// Values for a single sampled occurrence: hits and self time, with the
    /// aggregated channel equal to the self time.
    #[must_use]
    pub fn sampled(profiler_hits: i64, self_cpu_time: MicroSeconds) -> Self {
        Self {
            profiler_hits,
            self_cpu_time,
            aggregated_cpu_time: self_cpu_time,
            ..Self::default()
        }
    }

    /// Returns true if every channel is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Field-wise maximum.
    #[must_use]
    pub fn max(&self, other: &Self) -> Self {
        Self {
            profiler_hits: self.profiler_hits.max(other.profiler_hits),
            self_cpu_time: self.self_cpu_time.max(other.self_cpu_time),
            aggregated_cpu_time: self.aggregated_cpu_time.max(other.aggregated_cpu_time),
            intern_cpu_time: self.intern_cpu_time.max(other.intern_cpu_time),
            extern_cpu_time: self.extern_cpu_time.max(other.extern_cpu_time),
            lang_internal_cpu_time: self.lang_internal_cpu_time.max(other.lang_internal_cpu_time),
        }
    }

    /// Field-wise maximum over `values`, starting from the first one; all
    /// zeros if there is none.
    #[must_use]
    pub fn max_of<'a>(values: impl IntoIterator<Item = &'a SensorValues>) -> Self {
        let mut values = values.into_iter();
        match values.next() {
            Some(first) => values.fold(*first, |acc, v| acc.max(v)),
            None => Self::default(),
        }
    }

    /// The reference channel matching `kind`.
    #[must_use]
    pub fn reference_time(&self, kind: ReferenceKind) -> MicroSeconds {
        match kind {
            ReferenceKind::Intern => self.intern_cpu_time,
            ReferenceKind::Extern => self.extern_cpu_time,
            ReferenceKind::LangInternal => self.lang_internal_cpu_time,
        }
    }

    /// Adds `time` to the reference channel matching `kind`.
    pub fn add_reference_time(&mut self, kind: ReferenceKind, time: MicroSeconds) {
        match kind {
            ReferenceKind::Intern => self.intern_cpu_time += time,
            ReferenceKind::Extern => self.extern_cpu_time += time,
            ReferenceKind::LangInternal => self.lang_internal_cpu_time += time,
        }
    }
}

impl Add for SensorValues {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for SensorValues {
    fn add_assign(&mut self, rhs: Self) {
        self.profiler_hits += rhs.profiler_hits;
        self.self_cpu_time += rhs.self_cpu_time;
        self.aggregated_cpu_time += rhs.aggregated_cpu_time;
        self.intern_cpu_time += rhs.intern_cpu_time;
        self.extern_cpu_time += rhs.extern_cpu_time;
        self.lang_internal_cpu_time += rhs.lang_internal_cpu_time;
    }
}

impl Sub for SensorValues {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        self -= rhs;
        self
    }
}

impl SubAssign for SensorValues {
    fn sub_assign(&mut self, rhs: Self) {
        *self += -rhs;
    }
}

impl Neg for SensorValues {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            profiler_hits: -self.profiler_hits,
            self_cpu_time: -self.self_cpu_time,
            aggregated_cpu_time: -self.aggregated_cpu_time,
            intern_cpu_time: -self.intern_cpu_time,
            extern_cpu_time: -self.extern_cpu_time,
            lang_internal_cpu_time: -self.lang_internal_cpu_time,
        }
    }
}

impl core::iter::Sum for SensorValues {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
