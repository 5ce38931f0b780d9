// FormatSelector - picks what to download under a size budget
//
// Two phases:
// 1. Combined formats (video+audio in one file), best preference first,
//    larger file first on equal preference; first one within budget wins.
// 2. Fallback: best video-only + best audio-only, muxed by the fetcher.
//    Only the single best pairing is evaluated.

use std::cmp::Ordering;

use super::errors::SelectionError;
use super::models::{Catalog, DownloadPlan, FormatDescriptor};

/// Containers accepted when no allowlist is configured
pub const DEFAULT_EXTENSIONS: [&str; 2] = ["mp4", "webm"];

/// Format selector with a size budget
pub struct FormatSelector;

impl FormatSelector {
    /// Choose a plan for `catalog`; pure and deterministic
    pub fn select<S: AsRef<str>>(
        catalog: &Catalog,
        allowed_extensions: &[S],
        budget: u64,
    ) -> Result<DownloadPlan, SelectionError> {
        // A format without an id cannot be named in a selector
        let allowed = |f: &FormatDescriptor| {
            !f.id.trim().is_empty()
                && allowed_extensions
                    .iter()
                    .any(|ext| ext.as_ref().eq_ignore_ascii_case(&f.container))
        };

        if let Some(plan) = Self::best_combined(catalog, &allowed, budget) {
            return Ok(plan);
        }

        Self::best_pairing(catalog, &allowed, budget)
    }

    fn best_combined(
        catalog: &Catalog,
        allowed: &impl Fn(&FormatDescriptor) -> bool,
        budget: u64,
    ) -> Option<DownloadPlan> {
        let mut combined: Vec<(&FormatDescriptor, u64)> = catalog
            .formats()
            .iter()
            .filter(|f| f.is_combined() && allowed(f))
            .filter_map(|f| f.effective_size().map(|s| (f, s)))
            .collect();

        // Stable sort keeps catalog order for full ties
        combined.sort_by(|(a, size_a), (b, size_b)| {
            by_preference_desc(a, b).then_with(|| size_b.cmp(size_a))
        });

        combined
            .into_iter()
            .find(|(_, size)| *size <= budget)
            .map(|(f, size)| DownloadPlan::combined(f, size))
    }

    fn best_pairing(
        catalog: &Catalog,
        allowed: &impl Fn(&FormatDescriptor) -> bool,
        budget: u64,
    ) -> Result<DownloadPlan, SelectionError> {
        let best_video = Self::best_of(catalog, |f| f.is_video_only() && allowed(f));
        let best_audio = Self::best_of(catalog, |f| f.is_audio_only() && allowed(f));

        let ((video, video_size), (audio, audio_size)) = match (best_video, best_audio) {
            (Some(v), Some(a)) => (v, a),
            _ => return Err(SelectionError::NoViableFormats),
        };

        let combined_size = video_size.saturating_add(audio_size);
        if combined_size > budget {
            return Err(SelectionError::TooLarge {
                combined_size,
                budget,
            });
        }

        Ok(DownloadPlan::merged(video, audio, combined_size))
    }

    /// Highest preference among sized formats matching `keep`; first in catalog order on ties
    fn best_of<'a>(
        catalog: &'a Catalog,
        keep: impl Fn(&FormatDescriptor) -> bool,
    ) -> Option<(&'a FormatDescriptor, u64)> {
        let mut candidates: Vec<(&FormatDescriptor, u64)> = catalog
            .formats()
            .iter()
            .filter(|f| keep(f))
            .filter_map(|f| f.effective_size().map(|s| (f, s)))
            .collect();

        candidates.sort_by(|(a, _), (b, _)| by_preference_desc(a, b));
        candidates.into_iter().next()
    }
}

fn by_preference_desc(a: &FormatDescriptor, b: &FormatDescriptor) -> Ordering {
    b.preference.total_cmp(&a.preference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::PlanKind;

    const MB: u64 = 1_048_576;

    fn make_format(
        id: &str,
        ext: &str,
        video: bool,
        audio: bool,
        size: Option<u64>,
        preference: f64,
    ) -> FormatDescriptor {
        FormatDescriptor {
            id: id.to_string(),
            container: ext.to_string(),
            has_video: video,
            has_audio: audio,
            size_bytes: size,
            size_approx_bytes: None,
            preference,
        }
    }

    fn select(formats: Vec<FormatDescriptor>, budget: u64) -> Result<DownloadPlan, SelectionError> {
        FormatSelector::select(&Catalog::new(formats), &DEFAULT_EXTENSIONS, budget)
    }

    #[test]
    fn higher_preference_skipped_when_over_budget() {
        let plan = select(
            vec![
                make_format("A", "mp4", true, true, Some(50 * MB), 5.0),
                make_format("B", "mp4", true, true, Some(150 * MB), 10.0),
            ],
            100 * MB,
        )
        .unwrap();

        assert_eq!(plan.kind, PlanKind::Combined);
        assert_eq!(plan.selector, "A");
        assert_eq!(plan.estimated_size_bytes, 50 * MB);
        assert!(!plan.requires_muxing());
    }

    #[test]
    fn merges_best_video_and_audio() {
        let plan = select(
            vec![
                make_format("V", "mp4", true, false, Some(80 * MB), 9.0),
                make_format("Au", "webm", false, true, Some(10 * MB), 9.0),
            ],
            100 * MB,
        )
        .unwrap();

        assert_eq!(plan.kind, PlanKind::Merged);
        assert_eq!(plan.selector, "V+Au");
        assert_eq!(plan.estimated_size_bytes, 90 * MB);
        assert!(plan.requires_muxing());
    }

    #[test]
    fn larger_file_wins_on_equal_preference() {
        let plan = select(
            vec![
                make_format("small", "mp4", true, true, Some(10 * MB), 3.0),
                make_format("large", "webm", true, true, Some(40 * MB), 3.0),
                make_format("over", "mp4", true, true, Some(200 * MB), 3.0),
            ],
            100 * MB,
        )
        .unwrap();

        assert_eq!(plan.selector, "large");
    }

    #[test]
    fn greedy_first_fit_not_largest_fit() {
        // pref 7 fits first, even though a bigger pref-1 file also fits
        let plan = select(
            vec![
                make_format("hi", "mp4", true, true, Some(20 * MB), 7.0),
                make_format("lo", "mp4", true, true, Some(90 * MB), 1.0),
            ],
            100 * MB,
        )
        .unwrap();

        assert_eq!(plan.selector, "hi");
    }

    #[test]
    fn too_large_pairing_is_not_degraded() {
        let err = select(
            vec![
                make_format("V1", "mp4", true, false, Some(95 * MB), 9.0),
                make_format("V2", "mp4", true, false, Some(5 * MB), 1.0),
                make_format("A1", "webm", false, true, Some(10 * MB), 9.0),
            ],
            100 * MB,
        )
        .unwrap_err();

        assert_eq!(
            err,
            SelectionError::TooLarge {
                combined_size: 105 * MB,
                budget: 100 * MB,
            }
        );
    }

    #[test]
    fn ineligible_formats_give_no_viable() {
        let formats = vec![
            // wrong container
            make_format("flv", "flv", true, true, Some(MB), 1.0),
            // unknown size
            make_format("nosize", "mp4", true, true, None, 1.0),
            // no tracks at all
            make_format("sb", "mp4", false, false, Some(MB), 1.0),
            // video without any audio partner
            make_format("v", "mp4", true, false, Some(MB), 1.0),
        ];

        assert_eq!(select(formats, 100 * MB), Err(SelectionError::NoViableFormats));
        assert_eq!(select(Vec::new(), 100 * MB), Err(SelectionError::NoViableFormats));
    }

    #[test]
    fn zero_size_is_selectable() {
        let plan = select(vec![make_format("z", "mp4", true, true, Some(0), 0.0)], 0).unwrap();
        assert_eq!(plan.selector, "z");
        assert_eq!(plan.estimated_size_bytes, 0);
    }

    #[test]
    fn missing_preference_ranks_as_zero() {
        let plan = select(
            vec![
                make_format("neg", "mp4", true, true, Some(MB), -1.0),
                make_format("default", "mp4", true, true, Some(MB), 0.0),
            ],
            100 * MB,
        )
        .unwrap();

        assert_eq!(plan.selector, "default");
    }

    #[test]
    fn pairing_ignores_size_for_ranking() {
        let plan = select(
            vec![
                make_format("v-small", "webm", true, false, Some(5 * MB), 4.0),
                make_format("v-big", "webm", true, false, Some(50 * MB), 4.0),
                make_format("a", "webm", false, true, Some(MB), 2.0),
            ],
            100 * MB,
        )
        .unwrap();

        assert_eq!(plan.selector, "v-small+a");
        assert_eq!(plan.container, "webm");
    }

    #[test]
    fn allowlist_is_case_insensitive() {
        let catalog = Catalog::new(vec![make_format("x", "MP4", true, true, Some(MB), 0.0)]);
        let plan = FormatSelector::select(&catalog, &["mp4".to_string()], MB).unwrap();
        assert_eq!(plan.selector, "x");
    }

    #[test]
    fn selection_is_deterministic() {
        let formats = vec![
            make_format("a", "mp4", true, true, Some(30 * MB), 2.0),
            make_format("b", "mp4", true, true, Some(30 * MB), 2.0),
            make_format("c", "webm", true, false, Some(30 * MB), 8.0),
            make_format("d", "webm", false, true, Some(3 * MB), 8.0),
        ];
        let catalog = Catalog::new(formats);

        let first = FormatSelector::select(&catalog, &DEFAULT_EXTENSIONS, 100 * MB);
        for _ in 0..10 {
            assert_eq!(FormatSelector::select(&catalog, &DEFAULT_EXTENSIONS, 100 * MB), first);
        }
        assert_eq!(first.unwrap().selector, "a");
    }

    #[test]
    fn formats_without_id_are_never_selected() {
        let plan = select(
            vec![
                make_format("", "mp4", true, true, Some(10 * MB), 10.0),
                make_format("18", "mp4", true, true, Some(20 * MB), 1.0),
            ],
            100 * MB,
        )
        .unwrap();
        assert_eq!(plan.selector, "18");

        let err = select(
            vec![
                make_format(" ", "mp4", true, false, Some(10 * MB), 0.0),
                make_format("140", "webm", false, true, Some(MB), 0.0),
            ],
            100 * MB,
        )
        .unwrap_err();
        assert_eq!(err, SelectionError::NoViableFormats);
    }
}
