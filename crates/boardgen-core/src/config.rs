//! Runtime configuration drawn from the environment.
//!
//! Every knob has documented bounds; out-of-range values clamp rather than
//! error. The first process-wide read logs the effective values once and
//! the result is cached for the lifetime of the process.

use std::sync::OnceLock;

/// Tuning profile selecting the baseline defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Normal,
    Test,
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Attempt ceiling for the repair loop.
    pub max_repair_attempts: u32,
    /// Consecutive no-improvement attempts before stopping.
    pub retry_stagnation_limit: u32,
    /// Consecutive identical diagnostic sets before stopping.
    pub signature_repeat_limit: u32,
    /// Autorouter-exhaustion streak required for the early stop.
    pub autorouter_stall_limit: u32,
    /// No-blocking-reduction streak that switches to structural repair.
    pub structural_repair_trigger: u32,
    /// Structural transform budget per run.
    pub max_structural_repair_attempts: u32,
    /// Board growth ceiling for minor congestion relief (percent).
    pub minor_board_growth_cap_pct: u32,
    /// Component displacement ceiling for minor relief (millimetres).
    pub minor_component_shift_mm: u32,
    /// Minor relief passes before escalating to the structural spread.
    pub minor_relief_passes: u32,
    /// Per-attempt compile+validate deadline.
    pub compile_validate_timeout_ms: u64,
    /// Cadence of progress pulses during long stages.
    pub status_pulse_ms: u64,
    /// Speculative-compile gate.
    pub enable_connectivity_preflight: bool,
    /// Master switch for the structural transforms.
    pub enable_structural_repair_mode: bool,
}

impl RuntimeConfig {
    /// Baseline values for a profile, before environment overrides.
    pub fn defaults(profile: Profile) -> Self {
        let test = profile == Profile::Test;
        Self {
            max_repair_attempts: if test { 3 } else { 6 },
            retry_stagnation_limit: if test { 3 } else { 4 },
            signature_repeat_limit: if test { 2 } else { 3 },
            autorouter_stall_limit: if test { 2 } else { 4 },
            structural_repair_trigger: 2,
            max_structural_repair_attempts: if test { 1 } else { 3 },
            minor_board_growth_cap_pct: 20,
            minor_component_shift_mm: 3,
            minor_relief_passes: 2,
            compile_validate_timeout_ms: 240_000,
            status_pulse_ms: 8_000,
            enable_connectivity_preflight: true,
            enable_structural_repair_mode: true,
        }
    }

    /// Read the configuration from the environment with clamping.
    pub fn from_env() -> Self {
        let profile = match std::env::var("BOARDGEN_PROFILE").as_deref() {
            Ok("test") => Profile::Test,
            _ => Profile::Normal,
        };
        let base = Self::defaults(profile);
        Self {
            max_repair_attempts: env_u32("MAX_REPAIR_ATTEMPTS", base.max_repair_attempts, 1, 12),
            retry_stagnation_limit: env_u32(
                "RETRY_STAGNATION_LIMIT",
                base.retry_stagnation_limit,
                1,
                10,
            ),
            signature_repeat_limit: env_u32(
                "SIGNATURE_REPEAT_LIMIT",
                base.signature_repeat_limit,
                1,
                10,
            ),
            autorouter_stall_limit: env_u32(
                "AUTOROUTER_STALL_LIMIT",
                base.autorouter_stall_limit,
                1,
                12,
            ),
            structural_repair_trigger: env_u32(
                "STRUCTURAL_REPAIR_TRIGGER",
                base.structural_repair_trigger,
                1,
                6,
            ),
            max_structural_repair_attempts: env_u32(
                "MAX_STRUCTURAL_REPAIR_ATTEMPTS",
                base.max_structural_repair_attempts,
                0,
                3,
            ),
            minor_board_growth_cap_pct: env_u32(
                "MINOR_BOARD_GROWTH_CAP_PCT",
                base.minor_board_growth_cap_pct,
                5,
                60,
            ),
            minor_component_shift_mm: env_u32(
                "MINOR_COMPONENT_SHIFT_MM",
                base.minor_component_shift_mm,
                1,
                10,
            ),
            minor_relief_passes: env_u32("MINOR_RELIEF_PASSES", base.minor_relief_passes, 1, 4),
            compile_validate_timeout_ms: env_u64(
                "COMPILE_VALIDATE_TIMEOUT_MS",
                base.compile_validate_timeout_ms,
                10_000,
                u64::MAX,
            ),
            status_pulse_ms: env_u64("STATUS_PULSE_MS", base.status_pulse_ms, 3_000, 30_000),
            enable_connectivity_preflight: env_bool(
                "ENABLE_CONNECTIVITY_PREFLIGHT",
                base.enable_connectivity_preflight,
            ),
            enable_structural_repair_mode: env_bool(
                "ENABLE_STRUCTURAL_REPAIR_MODE",
                base.enable_structural_repair_mode,
            ),
        }
    }

    /// Process-wide cached configuration. The first call reads the
    /// environment and logs the effective values.
    pub fn global() -> &'static Self {
        static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();
        CONFIG.get_or_init(|| {
            let config = Self::from_env();
            tracing::info!(?config, "runtime config loaded");
            config
        })
    }
}

fn env_u32(name: &str, default: u32, min: u32, max: u32) -> u32 {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<i64>() {
            Ok(value) => {
                let clamped = value.clamp(min as i64, max as i64) as u32;
                if clamped as i64 != value {
                    tracing::warn!(var = name, value, clamped, "config value out of range");
                }
                clamped
            }
            Err(_) => {
                tracing::warn!(var = name, %raw, "config value not numeric, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) => {
                let clamped = value.clamp(min, max);
                if clamped != value {
                    tracing::warn!(var = name, value, clamped, "config value out of range");
                }
                clamped
            }
            Err(_) => {
                tracing::warn!(var = name, %raw, "config value not numeric, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => matches!(raw.trim(), "1" | "true" | "TRUE" | "yes" | "on"),
        Err(_) => default,
    }
}
