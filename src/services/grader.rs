//! Auto-grading: reconcile unresolved signals against final game scores with
//! market-specific arithmetic.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};

use crate::api::{OddsClient, ScoredGame};
use crate::config::Config;
use crate::db;

/// Days of score history requested per grading run; catches weekend games.
const SCORE_LOOKBACK_DAYS: u32 = 3;

/// Jaro-Winkler floor for treating two team names as the same team when they
/// don't match exactly (APIs disagree on punctuation and suffixes).
const NAME_SIMILARITY_MIN: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeOutcome {
    Won,
    Lost,
    Push,
}

impl GradeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeOutcome::Won => "won",
            GradeOutcome::Lost => "lost",
            GradeOutcome::Push => "push",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradeCounts {
    pub resolved: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Grade every unresolved signal for which a final score is available.
/// Games missing from the scores response stay unresolved for a later run.
pub async fn resolve_all(
    config: &Config,
    client: &OddsClient,
    pool: &SqlitePool,
) -> Result<GradeCounts> {
    let unresolved = db::get_unresolved_signals(pool).await?;
    if unresolved.is_empty() {
        tracing::info!("grader: nothing unresolved");
        return Ok(GradeCounts::default());
    }

    let mut sport_keys: HashSet<String> =
        db::get_unresolved_sport_keys(pool).await?.into_iter().collect();
    if sport_keys.is_empty() {
        sport_keys = config.sports.iter().cloned().collect();
    }

    let mut scores_by_event: HashMap<String, ScoredGame> = HashMap::new();
    for sport_key in &sport_keys {
        match client.fetch_scores(pool, sport_key, SCORE_LOOKBACK_DAYS).await {
            Ok(games) => {
                for game in games {
                    scores_by_event.insert(game.id.clone(), game);
                }
            }
            Err(error) => {
                tracing::error!(sport = %sport_key, %error, "grader score fetch failed");
            }
        }
    }

    let mut counts = GradeCounts::default();

    for sig in &unresolved {
        let Some(game) = scores_by_event.get(&sig.event_id) else {
            counts.skipped += 1;
            continue;
        };
        if game.scores.is_none() {
            counts.skipped += 1;
            continue;
        }

        let outcome = match sig.market_key.as_str() {
            "h2h" => grade_h2h(&sig.outcome_name, game),
            "spreads" | "totals" => {
                let point = db::get_reference_line(
                    pool,
                    &sig.event_id,
                    &sig.market_key,
                    &sig.outcome_name,
                    &sig.signal_at,
                )
                .await?;
                let Some(point) = point else {
                    tracing::warn!(
                        event_id = %sig.event_id,
                        market = %sig.market_key,
                        "grader: no reference line"
                    );
                    counts.skipped += 1;
                    continue;
                };
                if sig.market_key == "spreads" {
                    grade_spread(&sig.outcome_name, game, point)
                } else {
                    grade_total(&sig.outcome_name, game, point)
                }
            }
            other => {
                tracing::warn!(market = other, "grader: unknown market");
                counts.skipped += 1;
                continue;
            }
        };

        let Some(outcome) = outcome else {
            tracing::warn!(
                event_id = %sig.event_id,
                market = %sig.market_key,
                "grader: malformed score entry, skipping"
            );
            counts.skipped += 1;
            continue;
        };

        match db::resolve_signal(
            pool,
            &sig.event_id,
            &sig.signal_type,
            &sig.market_key,
            &sig.outcome_name,
            &sig.signal_at,
            outcome.as_str(),
        )
        .await
        {
            Ok(()) => {
                counts.resolved += 1;
                tracing::info!(
                    event_id = %sig.event_id,
                    signal_type = %sig.signal_type,
                    market = %sig.market_key,
                    outcome = %sig.outcome_name,
                    result = outcome.as_str(),
                    "signal resolved"
                );
            }
            Err(error) => {
                tracing::error!(event_id = %sig.event_id, %error, "grader: resolve failed");
                counts.errors += 1;
            }
        }
    }

    tracing::info!(
        resolved = counts.resolved,
        skipped = counts.skipped,
        errors = counts.errors,
        "grader complete"
    );
    Ok(counts)
}

/// Exact-first team name comparison with a fuzzy fallback.
fn team_matches(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    strsim::jaro_winkler(&a.to_lowercase(), &b.to_lowercase()) >= NAME_SIMILARITY_MIN
}

fn team_score(game: &ScoredGame, team: &str) -> Option<f64> {
    game.scores
        .as_ref()?
        .iter()
        .find(|score| team_matches(&score.name, team))
        .and_then(|score| score.score.trim().parse::<f64>().ok())
}

/// Moneyline: did the named team win? Equal scores push.
pub(crate) fn grade_h2h(outcome_name: &str, game: &ScoredGame) -> Option<GradeOutcome> {
    let home_score = team_score(game, &game.home_team)?;
    let away_score = team_score(game, &game.away_team)?;

    if home_score == away_score {
        return Some(GradeOutcome::Push);
    }
    let winner = if home_score > away_score {
        &game.home_team
    } else {
        &game.away_team
    };
    Some(if team_matches(outcome_name, winner) {
        GradeOutcome::Won
    } else {
        GradeOutcome::Lost
    })
}

/// Spread: the bet wins when team_score - opponent_score + point > 0.
pub(crate) fn grade_spread(
    outcome_name: &str,
    game: &ScoredGame,
    point: f64,
) -> Option<GradeOutcome> {
    let home_score = team_score(game, &game.home_team)?;
    let away_score = team_score(game, &game.away_team)?;

    let margin = if team_matches(outcome_name, &game.home_team) {
        home_score - away_score
    } else if team_matches(outcome_name, &game.away_team) {
        away_score - home_score
    } else {
        return Some(GradeOutcome::Push); // outcome names a team not in the game
    };

    let adjusted = margin + point;
    Some(if adjusted > 0.0 {
        GradeOutcome::Won
    } else if adjusted < 0.0 {
        GradeOutcome::Lost
    } else {
        GradeOutcome::Push
    })
}

/// Total: Over wins when combined > point, Under when combined < point.
pub(crate) fn grade_total(
    outcome_name: &str,
    game: &ScoredGame,
    point: f64,
) -> Option<GradeOutcome> {
    let home_score = team_score(game, &game.home_team)?;
    let away_score = team_score(game, &game.away_team)?;
    let combined = home_score + away_score;
    let over = outcome_name.eq_ignore_ascii_case("over");

    Some(if combined > point {
        if over {
            GradeOutcome::Won
        } else {
            GradeOutcome::Lost
        }
    } else if combined < point {
        if over {
            GradeOutcome::Lost
        } else {
            GradeOutcome::Won
        }
    } else {
        GradeOutcome::Push
    })
}
