use crate::config::ScoringSettings;

/// Share of upvotes in the total. A song nobody voted on sits at the
/// neutral midpoint rather than zero.
pub fn positive_ratio(upvotes: i64, downvotes: i64) -> f64 {
    let total = upvotes + downvotes;
    if total == 0 {
        return 0.5;
    }
    upvotes as f64 / total as f64
}

/// Per-song score maintained incrementally on every vote.
pub fn incremental_song_score(
    velocity_per_minute: f64,
    total_votes: i64,
    positive_ratio: f64,
    settings: &ScoringSettings,
) -> f64 {
    velocity_per_minute * settings.velocity_weight
        + total_votes as f64 * settings.total_votes_weight
        + positive_ratio * settings.positive_ratio_weight
}

/// Batch show score: vote mass dampened by how far out the show is.
/// Shows today or already started count as one day out.
pub fn batch_show_score(total_votes: i64, days_until_show: i64) -> f64 {
    let days = days_until_show.max(1);
    total_votes as f64 / ((days as f64) + 1.0).ln()
}

/// Batch artist score from audience size and activity.
pub fn batch_artist_score(followers: i64, upcoming_shows: i64) -> f64 {
    followers as f64 + upcoming_shows as f64 * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_ratio_neutral_at_zero_votes() {
        assert_eq!(positive_ratio(0, 0), 0.5);
        assert_eq!(positive_ratio(3, 1), 0.75);
        assert_eq!(positive_ratio(0, 4), 0.0);
    }

    #[test]
    fn test_incremental_song_score_weights() {
        let settings = ScoringSettings::default();
        let score = incremental_song_score(10.0, 100, 0.8, &settings);
        // 10 * 0.4 + 100 * 0.3 + 0.8 * 0.3
        assert!((score - 34.24).abs() < 1e-9);
    }

    #[test]
    fn test_show_score_dampens_with_distance() {
        let near = batch_show_score(100, 1);
        let far = batch_show_score(100, 30);
        assert!(near > far);
        assert!((near - 100.0 / 2.0_f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_show_score_clamps_days_to_one() {
        assert_eq!(batch_show_score(100, 0), batch_show_score(100, 1));
        assert_eq!(batch_show_score(100, -3), batch_show_score(100, 1));
    }

    #[test]
    fn test_artist_score() {
        assert_eq!(batch_artist_score(5000, 3), 8000.0);
        assert_eq!(batch_artist_score(0, 0), 0.0);
    }
}
