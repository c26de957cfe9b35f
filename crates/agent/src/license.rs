//! License gate — maps a tier to its iteration ceiling and context richness.
//!
//! Pure and recomputed per run; nothing here is mutated once resolved.

use codeloop_core::tier::{ContextMode, LicenseTier};

/// What a tier allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// `None` means unbounded.
    pub max_iterations: Option<u32>,
    pub allow_smart_context: bool,
    pub allow_full_context: bool,
}

impl TierLimits {
    pub fn allows(&self, mode: ContextMode) -> bool {
        match mode {
            ContextMode::Full => self.allow_full_context,
            ContextMode::Smart => self.allow_smart_context,
            ContextMode::Minimal => true,
        }
    }
}

/// The limits, effective context mode and optional downgrade notice of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResolution {
    pub tier: LicenseTier,
    pub limits: TierLimits,
    pub requested_mode: ContextMode,
    pub effective_mode: ContextMode,
    /// Shown once when `effective_mode` differs from the request.
    pub notice: Option<String>,
}

pub struct LicenseGate;

impl LicenseGate {
    pub fn limits(tier: LicenseTier) -> TierLimits {
        match tier {
            LicenseTier::Free => TierLimits {
                max_iterations: Some(50),
                allow_smart_context: false,
                allow_full_context: false,
            },
            LicenseTier::Standard => TierLimits {
                max_iterations: Some(200),
                allow_smart_context: true,
                allow_full_context: false,
            },
            LicenseTier::Pro => TierLimits {
                max_iterations: None,
                allow_smart_context: true,
                allow_full_context: true,
            },
        }
    }

    /// Step `requested` down (full → smart → minimal) until the tier allows it.
    pub fn effective_mode(limits: &TierLimits, requested: ContextMode) -> ContextMode {
        let mut mode = requested;
        while !limits.allows(mode) {
            match mode.downgrade() {
                Some(leaner) => mode = leaner,
                None => break,
            }
        }
        mode
    }

    pub fn resolve(tier: LicenseTier, requested: ContextMode) -> GateResolution {
        let limits = Self::limits(tier);
        let effective_mode = Self::effective_mode(&limits, requested);
        let notice = (effective_mode != requested).then(|| {
            format!(
                "\n[Context mode '{requested}' is not available on the {tier} plan; using '{effective_mode}' instead.]\n\n"
            )
        });

        GateResolution {
            tier,
            limits,
            requested_mode: requested,
            effective_mode,
            notice,
        }
    }
}
