use crate::models::{ExternalTrack, ItemSource, LocalCandidate, MatchedTrack};
use tracing::debug;

pub const DEFAULT_DURATION_TOLERANCE_SECS: u64 = 5;

const TITLE_ARTIST_SCORE: i32 = 15;
const TITLE_DURATION_SCORE: i32 = 10;

/// Pick the best local candidate for an external track.
///
/// Candidates are scanned in the order the catalog returned them:
/// - title, artist and duration all match: that candidate wins, scanning stops.
/// - title and artist match: adopted unless a tier-15 candidate is already held.
/// - title and duration match: adopted only while nothing better than tier 10 is held.
///
/// Within a tier the first candidate wins. Returns None when no candidate
/// reached at least tier 10.
pub fn select_best_match<'a>(
    external: &ExternalTrack,
    candidates: &'a [LocalCandidate],
    duration_tolerance_secs: u64,
) -> Option<&'a LocalCandidate> {
    let mut best: Option<&LocalCandidate> = None;
    let mut best_score: i32 = -1;

    for cand in candidates {
        let title_match = cand.title.to_lowercase() == external.title.to_lowercase();
        let artist_match = cand.artist.to_lowercase() == external.artist.to_lowercase();
        let duration_match = match (cand.duration_secs, external.duration_secs) {
            (Some(a), Some(b)) => a.abs_diff(b) <= duration_tolerance_secs,
            _ => false,
        };

        if title_match && artist_match && duration_match {
            debug!("perfect match for {:?}: {} (title+artist+duration)", external.title, cand.local_id);
            return Some(cand);
        }
        if title_match && artist_match && best_score < TITLE_ARTIST_SCORE {
            debug!("good match for {:?}: {} (title+artist)", external.title, cand.local_id);
            best = Some(cand);
            best_score = TITLE_ARTIST_SCORE;
        }
        if title_match && duration_match && best_score < TITLE_DURATION_SCORE {
            debug!("decent match for {:?}: {} (title+duration)", external.title, cand.local_id);
            best = Some(cand);
            best_score = TITLE_DURATION_SCORE;
        }
    }

    best
}

/// Build the merged record for a winning candidate: playable identity and
/// tags from the local catalog, artwork from the external track.
pub fn merge_match(external: &ExternalTrack, winner: &LocalCandidate) -> MatchedTrack {
    MatchedTrack {
        local_id: winner.local_id.clone(),
        title: winner.title.clone(),
        artist: winner.artist.clone(),
        album: winner.album.clone(),
        artwork_url: external.artwork_url.clone(),
        duration_secs: winner.duration_secs,
        source: ItemSource::EmbyNcmArtwork,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(title: &str, artist: &str, dur: Option<u64>) -> ExternalTrack {
        ExternalTrack {
            external_id: "n1".into(),
            title: title.into(),
            artist: artist.into(),
            album: Some("NCM Album".into()),
            artwork_url: Some("https://p1.music.126.net/cover.jpg".into()),
            duration_secs: dur,
        }
    }

    fn cand(id: &str, title: &str, artist: &str, dur: Option<u64>) -> LocalCandidate {
        LocalCandidate {
            local_id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: "Local Album".into(),
            artwork_url: Some("http://emby/Items/x/Images/Primary".into()),
            duration_secs: dur,
        }
    }

    fn pick<'a>(e: &ExternalTrack, c: &'a [LocalCandidate]) -> Option<&'a str> {
        select_best_match(e, c, DEFAULT_DURATION_TOLERANCE_SECS).map(|c| c.local_id.as_str())
    }

    #[test]
    fn perfect_match_within_tolerance() {
        let e = ext("A", "B", Some(200));
        let c = vec![cand("1", "A", "B", Some(201))];
        assert_eq!(pick(&e, &c), Some("1"));
    }

    #[test]
    fn title_artist_match_beats_title_only() {
        let e = ext("A", "B", Some(200));
        let c = vec![cand("1", "A", "X", Some(500)), cand("2", "A", "B", Some(500))];
        assert_eq!(pick(&e, &c), Some("2"));
    }

    #[test]
    fn zero_candidates_is_none() {
        assert_eq!(pick(&ext("A", "B", Some(1)), &[]), None);
    }

    #[test]
    fn comparisons_ignore_case() {
        let e = ext("Hello World", "Some Band", Some(180));
        let c = vec![cand("1", "hello world", "SOME BAND", Some(184))];
        assert_eq!(pick(&e, &c), Some("1"));
    }

    #[test]
    fn perfect_match_stops_scan_and_overrides_earlier_tiers() {
        let e = ext("A", "B", Some(200));
        let c = vec![
            cand("t10", "A", "Other", Some(202)),
            cand("t15", "A", "B", None),
            cand("perfect", "A", "B", Some(196)),
            cand("later", "A", "B", Some(200)),
        ];
        assert_eq!(pick(&e, &c), Some("perfect"));
    }

    #[test]
    fn first_candidate_wins_within_a_tier() {
        let e = ext("A", "B", Some(200));
        let c = vec![cand("first", "A", "B", None), cand("second", "A", "B", Some(999))];
        assert_eq!(pick(&e, &c), Some("first"));

        let c = vec![cand("first", "A", "X", Some(199)), cand("second", "A", "Y", Some(200))];
        assert_eq!(pick(&e, &c), Some("first"));
    }

    #[test]
    fn title_duration_does_not_displace_title_artist() {
        let e = ext("A", "B", Some(200));
        let c = vec![cand("t15", "A", "B", Some(400)), cand("t10", "A", "Z", Some(200))];
        assert_eq!(pick(&e, &c), Some("t15"));
    }

    #[test]
    fn title_artist_upgrades_earlier_title_duration() {
        let e = ext("A", "B", Some(200));
        let c = vec![cand("t10", "A", "Z", Some(200)), cand("t15", "A", "B", Some(400))];
        assert_eq!(pick(&e, &c), Some("t15"));
    }

    #[test]
    fn missing_durations_never_count_as_duration_match() {
        let e = ext("A", "B", None);
        let c = vec![cand("1", "A", "X", None), cand("2", "A", "Y", Some(200))];
        assert_eq!(pick(&e, &c), None);
    }

    #[test]
    fn duration_outside_tolerance_rejected() {
        let e = ext("A", "B", Some(200));
        let c = vec![cand("1", "A", "X", Some(206)), cand("2", "Other", "B", Some(200))];
        assert_eq!(pick(&e, &c), None);
    }

    #[test]
    fn merged_record_keeps_external_artwork() {
        let e = ext("A", "B", Some(200));
        let c = cand("local-9", "A", "B", Some(201));
        let m = merge_match(&e, &c);
        assert_eq!(m.local_id, "local-9");
        assert_eq!(m.album, "Local Album");
        assert_eq!(m.duration_secs, Some(201));
        assert_eq!(m.artwork_url.as_deref(), Some("https://p1.music.126.net/cover.jpg"));
        assert_eq!(m.source, ItemSource::EmbyNcmArtwork);
    }
}
