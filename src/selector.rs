#[allow(unused_imports)]
use log::{info,warn,debug,error};

use crate::podchaser::Episode;

/// Orders episodes newest first (undated ones last, input order kept among equals), keeps
/// those whose title contains `filter` (case-insensitive), truncates to `max_count` and
/// then drops any without an audio URL. The result may be empty.
///
/// An episode is dated when it carries an air date at all. Dates that don't parse are
/// ordered by their raw text.
pub fn select(episodes: Vec<Episode>, max_count: usize, filter: Option<&str>) -> Vec<Episode> {
    let (mut dated, undated): (Vec<_>, Vec<_>) = episodes
        .into_iter()
        .map(|e| (e.air_date_key(), e))
        .partition(|(d, _)| d.is_some());
    // stable: equal dates keep their input order
    dated.sort_by(|(a, _), (b, _)| b.cmp(a));

    let mut ordered: Vec<Episode> = dated.into_iter().chain(undated).map(|(_, e)| e).collect();

    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        let needle = filter.to_lowercase();
        ordered.retain(|e| e.title.to_lowercase().contains(&needle));
        info!("filtered to {} episodes matching '{}'", ordered.len(), filter);
    }

    ordered.truncate(max_count);
    ordered.retain(|e| {
        let keep = e.audio_url().is_some();
        if !keep {
            warn!("episode {} has no audio URL, skipping", e);
        }
        keep
    });

    info!("ready to transcribe {} episodes", ordered.len());
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(title: &str, date: Option<&str>, url: Option<&str>) -> Episode {
        Episode::new(title, date, url)
    }

    fn titles(eps: &[Episode]) -> Vec<&str> {
        eps.iter().map(|e| e.title.as_str()).collect()
    }

    fn sample() -> Vec<Episode> {
        vec![
            ep("Ep1", Some("2024-01-02"), Some("http://a")),
            ep("Ep2", Some("2024-01-01"), Some("http://b")),
        ]
    }

    #[test]
    fn newest_first() {
        assert_eq!(titles(&select(sample(), 2, None)), ["Ep1", "Ep2"]);

        let mut reversed = sample();
        reversed.reverse();
        assert_eq!(titles(&select(reversed, 2, None)), ["Ep1", "Ep2"]);
    }

    #[test]
    fn filter_picks_single() {
        assert_eq!(titles(&select(sample(), 2, Some("Ep2"))), ["Ep2"]);
    }

    #[test]
    fn missing_audio_is_dropped_after_truncation() {
        let eps = vec![
            ep("a", Some("2024-03-01"), Some("http://a")),
            ep("b", Some("2024-02-01"), Some("")),
            ep("c", Some("2024-01-01"), None),
            ep("d", Some("2023-12-01"), Some("http://d")),
        ];
        // "d" is not promoted into the gap left by "b"
        assert_eq!(titles(&select(eps, 2, None)), ["a"]);
    }

    #[test]
    fn undated_after_dated_in_input_order() {
        let eps = vec![
            ep("u1", None, Some("http://1")),
            ep("old", Some("2020-05-05 10:00:00"), Some("http://2")),
            ep("u2", Some(""), Some("http://3")),
            ep("new", Some("2024-05-05T10:00:00Z"), Some("http://4")),
            ep("tie-first", Some("2022-01-01"), Some("http://5")),
            ep("tie-second", Some("2022-01-01"), Some("http://6")),
        ];
        assert_eq!(
            titles(&select(eps, 10, None)),
            ["new", "tie-first", "tie-second", "old", "u1", "u2"]
        );
    }

    #[test]
    fn iso_dates_sort_with_the_rest() {
        let eps = vec![
            ep("old", Some("2024-01-01"), Some("http://1")),
            ep("newest", Some("2024-06-01T10:00"), Some("http://2")),
            ep("newer", Some("2024-05-01T10:00:00.5"), Some("http://3")),
            ep("offset", Some("2024-03-01T10:00:00+02:00"), Some("http://4")),
        ];
        assert_eq!(titles(&select(eps.clone(), 4, None)), ["newest", "newer", "offset", "old"]);
        assert_eq!(titles(&select(eps, 1, None)), ["newest"]);
    }

    #[test]
    fn unparseable_date_is_still_dated() {
        let eps = vec![
            ep("undated", None, Some("http://1")),
            ep("odd", Some("sometime in 2023"), Some("http://2")),
            ep("dated", Some("2024-01-01"), Some("http://3")),
        ];
        assert_eq!(titles(&select(eps, 3, None)), ["odd", "dated", "undated"]);
    }

    #[test]
    fn filter_applies_before_truncation() {
        let mut eps: Vec<Episode> = (1..=9)
            .map(|i| ep(&format!("Episode {}", i), Some(&format!("2024-01-0{}", i)), Some("http://x")))
            .collect();
        eps.push(ep("Series 19 finale", Some("2019-01-01"), Some("http://f")));

        assert!(select(eps.clone(), 3, None).iter().all(|e| !e.title.contains("Series")));
        assert_eq!(titles(&select(eps, 3, Some("series 19"))), ["Series 19 finale"]);
    }

    #[test]
    fn case_insensitive_filter() {
        assert_eq!(titles(&select(sample(), 5, Some("eP1"))), ["Ep1"]);
    }

    #[test]
    fn empty_selection_is_fine() {
        assert!(select(sample(), 5, Some("nothing like this")).is_empty());
        assert!(select(sample(), 0, None).is_empty());
        assert!(select(vec![], 5, None).is_empty());
    }

    #[test]
    fn bounded_and_playable() {
        let eps: Vec<Episode> = (0..40)
            .map(|i| {
                let date = if i % 3 == 0 { None } else { Some(format!("2023-{:02}-{:02}", i % 12 + 1, i % 28 + 1)) };
                let url = if i % 4 == 0 { None } else { Some(format!("http://{}", i)) };
                ep(&format!("ep {}", i), date.as_deref(), url.as_deref())
            })
            .collect();
        for max in 0..45 {
            let out = select(eps.clone(), max, None);
            assert!(out.len() <= max);
            assert!(out.iter().all(|e| e.audio_url().is_some()));
            let dates: Vec<_> = out.iter().map(|e| e.aired_at()).collect();
            let first_undated = dates.iter().position(|d| d.is_none()).unwrap_or(dates.len());
            assert!(dates[first_undated..].iter().all(|d| d.is_none()));
            assert!(dates[..first_undated].windows(2).all(|w| w[0] >= w[1]));
        }
    }
}
