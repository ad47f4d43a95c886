//! Large-file mode: thresholds, presets and the activation policy.
//!
//! Every check is a pure function of its inputs. A limit is exceeded only
//! when the value is strictly greater than it, so a diff sitting exactly on a
//! threshold stays in normal mode.

use crate::git::DiffPreflightStats;
use serde::{Deserialize, Serialize};

/// Named threshold sets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    #[default]
    Default,
    Conservative,
    Aggressive,
}

impl Preset {
    pub fn thresholds(self) -> LfmThresholds {
        match self {
            Preset::Default => LfmThresholds::DEFAULT,
            Preset::Conservative => LfmThresholds::CONSERVATIVE,
            Preset::Aggressive => LfmThresholds::AGGRESSIVE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::Default => "default",
            Preset::Conservative => "conservative",
            Preset::Aggressive => "aggressive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Preset::Default),
            "conservative" => Some(Preset::Conservative),
            "aggressive" => Some(Preset::Aggressive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LfmThresholds {
    pub max_bytes: u64,
    pub max_lines: u64,
    pub max_line_length: u64,
    pub max_hunks: u64,
}

impl LfmThresholds {
    pub const DEFAULT: Self = Self {
        max_bytes: 10 * 1024 * 1024,
        max_lines: 50_000,
        max_line_length: 2_000,
        max_hunks: 1_000,
    };

    pub const CONSERVATIVE: Self = Self {
        max_bytes: 2 * 1024 * 1024,
        max_lines: 10_000,
        max_line_length: 1_000,
        max_hunks: 200,
    };

    pub const AGGRESSIVE: Self = Self {
        max_bytes: 50 * 1024 * 1024,
        max_lines: 200_000,
        max_line_length: 10_000,
        max_hunks: 5_000,
    };
}

impl Default for LfmThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One of the four measured limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    Bytes,
    Lines,
    LineLength,
    Hunks,
}

impl Limit {
    pub fn label(self) -> &'static str {
        match self {
            Limit::Bytes => "bytes",
            Limit::Lines => "lines",
            Limit::LineLength => "line length",
            Limit::Hunks => "hunks",
        }
    }
}

/// Limits the stats exceed, in a fixed order
pub fn exceeded_limits(stats: &DiffPreflightStats, thresholds: &LfmThresholds) -> Vec<Limit> {
    let checks = [
        (Limit::Bytes, stats.byte_size, thresholds.max_bytes),
        (Limit::Lines, stats.changed_lines, thresholds.max_lines),
        (Limit::LineLength, stats.max_line_length, thresholds.max_line_length),
        (Limit::Hunks, stats.hunk_count, thresholds.max_hunks),
    ];
    checks
        .into_iter()
        .filter(|&(_, value, limit)| value > limit)
        .map(|(which, _, _)| which)
        .collect()
}

/// True if any single measurement exceeds its threshold.
pub fn should_activate_lfm(stats: &DiffPreflightStats, thresholds: &LfmThresholds) -> bool {
    stats.byte_size > thresholds.max_bytes
        || stats.changed_lines > thresholds.max_lines
        || stats.max_line_length > thresholds.max_line_length
        || stats.hunk_count > thresholds.max_hunks
}

/// An optional feature switched off while large-file mode is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    WordDiffDisabled,
    SyntaxHighlightDisabled,
    SideBySideDisabled,
}

impl Degradation {
    pub fn label(self) -> &'static str {
        match self {
            Degradation::WordDiffDisabled => "no word diff",
            Degradation::SyntaxHighlightDisabled => "no syntax",
            Degradation::SideBySideDisabled => "no split",
        }
    }
}

/// The degradations in effect for a given activation state. Always the full
/// bundle or nothing.
pub fn degradations(active: bool) -> Vec<Degradation> {
    if active {
        vec![
            Degradation::WordDiffDisabled,
            Degradation::SyntaxHighlightDisabled,
            Degradation::SideBySideDisabled,
        ]
    } else {
        Vec::new()
    }
}

/// Which optional features may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSet {
    pub word_diff: bool,
    pub syntax_highlight: bool,
    pub side_by_side: bool,
}

impl FeatureSet {
    pub fn for_lfm(active: bool) -> Self {
        let degraded = degradations(active);
        Self {
            word_diff: !degraded.contains(&Degradation::WordDiffDisabled),
            syntax_highlight: !degraded.contains(&Degradation::SyntaxHighlightDisabled),
            side_by_side: !degraded.contains(&Degradation::SideBySideDisabled),
        }
    }
}

/// Manual override for one file or one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    On,
    Off,
    #[default]
    Auto,
}

impl OverrideMode {
    pub fn cycle(self) -> Self {
        match self {
            OverrideMode::Auto => OverrideMode::On,
            OverrideMode::On => OverrideMode::Off,
            OverrideMode::Off => OverrideMode::Auto,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OverrideMode::On => "on",
            OverrideMode::Off => "off",
            OverrideMode::Auto => "auto",
        }
    }
}

/// A per-file config entry takes precedence over the CLI flag.
pub fn resolve_override(file_entry: Option<OverrideMode>, cli: OverrideMode) -> OverrideMode {
    file_entry.unwrap_or(cli)
}

/// Combine per-file entries for a diff that spans many files. The session
/// has one mode: any file forced `on` turns LFM on; if every file is forced
/// `off` it stays off; otherwise the CLI flag decides.
pub fn resolve_worktree_override(file_entries: &[Option<OverrideMode>], cli: OverrideMode) -> OverrideMode {
    if file_entries.contains(&Some(OverrideMode::On)) {
        return OverrideMode::On;
    }
    if !file_entries.is_empty() && file_entries.iter().all(|e| *e == Some(OverrideMode::Off)) {
        return OverrideMode::Off;
    }
    cli
}

/// Why the session ended up in (or out of) large-file mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Thresholds,
    Forced,
    Disabled,
    /// Preflight failed or was skipped; parse in full
    NoPreflight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LfmDecision {
    pub active: bool,
    pub reason: DecisionReason,
    pub thresholds: LfmThresholds,
    pub exceeded: Vec<Limit>,
    pub degradations: Vec<Degradation>,
}

impl LfmDecision {
    pub fn features(&self) -> FeatureSet {
        FeatureSet::for_lfm(self.active)
    }
}

pub fn decide(
    stats: Option<&DiffPreflightStats>,
    thresholds: LfmThresholds,
    mode: OverrideMode,
) -> LfmDecision {
    let exceeded = stats
        .map(|s| exceeded_limits(s, &thresholds))
        .unwrap_or_default();
    let (active, reason) = match (mode, stats) {
        (OverrideMode::On, _) => (true, DecisionReason::Forced),
        (OverrideMode::Off, _) => (false, DecisionReason::Disabled),
        (OverrideMode::Auto, Some(s)) => (should_activate_lfm(s, &thresholds), DecisionReason::Thresholds),
        (OverrideMode::Auto, None) => (false, DecisionReason::NoPreflight),
    };
    LfmDecision {
        active,
        reason,
        thresholds,
        exceeded,
        degradations: degradations(active),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(lines: u64, hunks: u64) -> DiffPreflightStats {
        DiffPreflightStats {
            changed_lines: lines,
            hunk_count: hunks,
            ..Default::default()
        }
    }

    #[test]
    fn small_diff_stays_normal() {
        let s = stats(50, 2);
        assert!(!should_activate_lfm(&s, &LfmThresholds::DEFAULT));
        let decision = decide(Some(&s), LfmThresholds::DEFAULT, OverrideMode::Auto);
        assert!(decision.degradations.is_empty());
        assert_eq!(
            decision.features(),
            FeatureSet {
                word_diff: true,
                syntax_highlight: true,
                side_by_side: true
            }
        );
    }

    #[test]
    fn huge_diff_degrades_everything() {
        let s = stats(120_000, 1_500);
        assert!(should_activate_lfm(&s, &LfmThresholds::DEFAULT));
        let decision = decide(Some(&s), LfmThresholds::DEFAULT, OverrideMode::Auto);
        assert_eq!(
            decision.degradations,
            vec![
                Degradation::WordDiffDisabled,
                Degradation::SyntaxHighlightDisabled,
                Degradation::SideBySideDisabled
            ]
        );
        assert_eq!(decision.exceeded, vec![Limit::Lines, Limit::Hunks]);
    }

    #[test]
    fn activation_is_pure() {
        let s = stats(50_001, 3);
        let first = should_activate_lfm(&s, &LfmThresholds::DEFAULT);
        let second = should_activate_lfm(&s, &LfmThresholds::DEFAULT);
        assert_eq!(first, second);
        assert_eq!(
            decide(Some(&s), LfmThresholds::DEFAULT, OverrideMode::Auto),
            decide(Some(&s), LfmThresholds::DEFAULT, OverrideMode::Auto)
        );
    }

    #[test]
    fn value_equal_to_limit_does_not_activate() {
        let t = LfmThresholds::DEFAULT;
        let at_limit = DiffPreflightStats {
            byte_size: t.max_bytes,
            changed_lines: t.max_lines,
            max_line_length: t.max_line_length,
            hunk_count: t.max_hunks,
            ..Default::default()
        };
        assert!(!should_activate_lfm(&at_limit, &t));
        assert!(exceeded_limits(&at_limit, &t).is_empty());

        let over = DiffPreflightStats {
            max_line_length: t.max_line_length + 1,
            ..at_limit
        };
        assert!(should_activate_lfm(&over, &t));
    }

    #[test]
    fn any_single_limit_is_enough() {
        let t = LfmThresholds::CONSERVATIVE;
        let wide = DiffPreflightStats {
            max_line_length: 5_000,
            ..stats(1, 1)
        };
        assert!(should_activate_lfm(&wide, &t));
        assert!(!should_activate_lfm(&wide, &LfmThresholds::AGGRESSIVE));
    }

    #[test]
    fn overrides_beat_thresholds() {
        let small = stats(1, 1);
        let huge = stats(1_000_000, 1);
        assert!(decide(Some(&small), LfmThresholds::DEFAULT, OverrideMode::On).active);
        assert!(!decide(Some(&huge), LfmThresholds::DEFAULT, OverrideMode::Off).active);
        assert_eq!(resolve_override(Some(OverrideMode::Off), OverrideMode::On), OverrideMode::Off);
        assert_eq!(resolve_override(None, OverrideMode::On), OverrideMode::On);
    }

    #[test]
    fn worktree_override_combines_file_entries() {
        use OverrideMode::*;
        assert_eq!(resolve_worktree_override(&[None, Some(On)], Off), On);
        assert_eq!(resolve_worktree_override(&[Some(Off), Some(On)], Auto), On);
        assert_eq!(resolve_worktree_override(&[Some(Off), Some(Off)], On), Off);
        assert_eq!(resolve_worktree_override(&[Some(Off), None], On), On);
        assert_eq!(resolve_worktree_override(&[Some(Auto), None], Off), Off);
        assert_eq!(resolve_worktree_override(&[], Auto), Auto);
    }

    #[test]
    fn missing_preflight_falls_back_to_full_parse() {
        let decision = decide(None, LfmThresholds::DEFAULT, OverrideMode::Auto);
        assert!(!decision.active);
        assert_eq!(decision.reason, DecisionReason::NoPreflight);
    }

    #[test]
    fn presets_parse_and_order() {
        assert_eq!(Preset::parse("conservative"), Some(Preset::Conservative));
        assert_eq!(Preset::parse("huge"), None);
        let c = Preset::Conservative.thresholds();
        let a = Preset::Aggressive.thresholds();
        assert!(c.max_lines < LfmThresholds::DEFAULT.max_lines && LfmThresholds::DEFAULT.max_lines < a.max_lines);
    }
}
