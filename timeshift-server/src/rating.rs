//! Elo updates for a finished match.
//!
//! Every participant is rated against the mean rating of the opposing color,
//! so a Team match moves all six ratings at once.

use timeshift_core::{Color, MatchResult};

/// Default K-factor.
pub const DEFAULT_K: f64 = 24.0;

/// Expected score of `rating` against an opponent rated `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10_f64.powf((opponent - rating) / 400.0))
}

/// A rated participant of the match.
#[derive(Clone, Debug, PartialEq)]
pub struct Participant {
    pub player_id: String,
    pub color: Color,
    pub rating: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RatingChange {
    pub player_id: String,
    pub old_rating: i64,
    pub new_rating: i64,
}

fn mean_rating(participants: &[Participant], color: Color) -> Option<f64> {
    let ratings: Vec<f64> = participants
        .iter()
        .filter(|p| p.color == color)
        .map(|p| p.rating as f64)
        .collect();
    if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
    }
}

/// New rating for every participant. No floor is applied.
pub fn update_ratings(participants: &[Participant], result: MatchResult, k: f64) -> Vec<RatingChange> {
    participants
        .iter()
        .map(|p| {
            let own = p.rating as f64;
            let opponent = mean_rating(participants, p.color.opponent()).unwrap_or(own);
            let expected = expected_score(own, opponent);
            let delta = (k * (result.score_for(p.color) - expected)).round() as i64;
            RatingChange {
                player_id: p.player_id.clone(),
                old_rating: p.rating,
                new_rating: p.rating + delta,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str, color: Color, rating: i64) -> Participant {
        Participant {
            player_id: id.to_string(),
            color,
            rating,
        }
    }

    #[test]
    fn test_expected_score() {
        assert!((expected_score(1200.0, 1200.0) - 0.5).abs() < 1e-9);
        assert!(expected_score(1400.0, 1200.0) > 0.75);
        assert!(expected_score(1200.0, 1400.0) < 0.25);
    }

    #[test]
    fn test_solo_white_win_even_ratings() {
        let players = [p("w", Color::White, 1200), p("b", Color::Black, 1200)];
        let changes = update_ratings(&players, MatchResult::White, DEFAULT_K);
        assert_eq!(changes[0].new_rating, 1212);
        assert_eq!(changes[1].new_rating, 1188);
    }

    #[test]
    fn test_draw_between_equals_changes_nothing() {
        let players = [p("w", Color::White, 1500), p("b", Color::Black, 1500)];
        let changes = update_ratings(&players, MatchResult::Draw, DEFAULT_K);
        assert!(changes.iter().all(|c| c.new_rating == c.old_rating));
    }

    #[test]
    fn test_team_uses_opposing_mean() {
        let players = [
            p("w1", Color::White, 1000),
            p("w2", Color::White, 1200),
            p("w3", Color::White, 1400),
            p("b1", Color::Black, 1200),
            p("b2", Color::Black, 1200),
            p("b3", Color::Black, 1200),
        ];
        let changes = update_ratings(&players, MatchResult::Black, DEFAULT_K);
        // Every Black player faced a 1200 mean: an even game.
        for change in &changes[3..] {
            assert_eq!(change.new_rating, 1212);
        }
        // The weakest White player loses the least.
        assert!(changes[0].new_rating - 1000 > changes[2].new_rating - 1400);
    }

    #[test]
    fn test_no_floor() {
        let players = [p("w", Color::White, 5), p("b", Color::Black, 5)];
        let changes = update_ratings(&players, MatchResult::Black, 100.0);
        assert_eq!(changes[0].new_rating, -45);
    }
}
