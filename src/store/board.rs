//! Leaderboard builder.
//!
//! A pure function from per-player hole results to sorted board rows. The
//! format picks the primary metric; ties fall through gross, earliest
//! under-par time, earliest finish time and finally the lower-cased name.

use std::time::Instant;

use serde_json::json;
use time::OffsetDateTime;

use crate::telemetry;

/// One scored hole as the builder consumes it.
#[derive(Debug, Clone)]
pub struct HoleResult {
    /// Hole number, 1..=18.
    pub hole: u8,
    /// Gross strokes.
    pub gross: i64,
    /// Net strokes; falls back to gross when absent.
    pub net: Option<i64>,
    /// Stableford points.
    pub stableford: Option<i64>,
    /// Hole par.
    pub par: Option<i64>,
    /// Time the hole score was last written.
    pub updated_at: OffsetDateTime,
}

/// One player's results, holes sorted ascending.
#[derive(Debug, Clone)]
pub struct PlayerScores {
    /// Scorecard id.
    pub scorecard_id: String,
    /// Display name.
    pub name: String,
    /// Scored holes.
    pub holes: Vec<HoleResult>,
}

/// One computed leaderboard row.
#[derive(Debug, Clone)]
pub struct BoardRow {
    /// Scorecard id.
    pub scorecard_id: String,
    /// Display name.
    pub name: String,
    /// Total gross strokes.
    pub gross: i64,
    /// Total net strokes (gross fallback per hole).
    pub net: i64,
    /// Total stableford points; absent when no hole carried any.
    pub stableford: Option<i64>,
    /// Holes completed.
    pub thru: u8,
    /// Next hole to play; absent once all 18 are in.
    pub hole: Option<u8>,
    /// Latest time the cumulative net dropped below cumulative par.
    pub last_under_par_at: Option<OffsetDateTime>,
    /// Time the round completed, when it did.
    pub finished_at: Option<OffsetDateTime>,
    /// Latest write across the player's holes.
    pub updated_at: Option<OffsetDateTime>,
}

/// A built leaderboard.
#[derive(Debug, Clone)]
pub struct Board {
    /// Format the rows are sorted under.
    pub gross_net: String,
    /// Sorted rows.
    pub players: Vec<BoardRow>,
    /// Latest write across all rows.
    pub updated_at: Option<OffsetDateTime>,
}

const HOLES_PER_ROUND: usize = 18;

/// Build and sort the board for `format`; unknown formats fall back to net.
pub fn build_board(format: &str, players: Vec<PlayerScores>) -> Board {
    let started = Instant::now();
    let mode = match format {
        "gross" | "stableford" => format,
        _ => "net",
    };

    let mut rows: Vec<BoardRow> = players.into_iter().map(compute_row).collect();
    rows.sort_by(|a, b| sort_key(mode, a).partial_cmp(&sort_key(mode, b)).unwrap_or(std::cmp::Ordering::Equal));

    let updated_at = rows.iter().filter_map(|row| row.updated_at).max();
    telemetry::emit(
        "board.build_ms",
        json!({
            "mode": mode,
            "rows": rows.len(),
            "ms": started.elapsed().as_millis() as u64,
        }),
    );
    Board {
        gross_net: mode.to_string(),
        players: rows,
        updated_at,
    }
}

fn compute_row(player: PlayerScores) -> BoardRow {
    let mut gross = 0i64;
    let mut net = 0i64;
    let mut stableford_total = 0i64;
    let mut has_stableford = false;
    let mut cumulative_net = 0i64;
    let mut cumulative_par = 0i64;
    let mut last_under_par_at = None;
    let mut updated_at: Option<OffsetDateTime> = None;

    for hole in &player.holes {
        let hole_net = hole.net.unwrap_or(hole.gross);
        gross += hole.gross;
        net += hole_net;
        if let Some(points) = hole.stableford {
            stableford_total += points;
            has_stableford = true;
        }
        if let Some(par) = hole.par {
            cumulative_net += hole_net;
            cumulative_par += par;
            if cumulative_net < cumulative_par {
                last_under_par_at = Some(
                    last_under_par_at.map_or(hole.updated_at, |at: OffsetDateTime| {
                        at.max(hole.updated_at)
                    }),
                );
            }
        }
        updated_at = Some(updated_at.map_or(hole.updated_at, |at| at.max(hole.updated_at)));
    }

    let thru = player.holes.len().min(HOLES_PER_ROUND) as u8;
    let played: Vec<u8> = player.holes.iter().map(|hole| hole.hole).collect();
    let next_hole = (1..=HOLES_PER_ROUND as u8).find(|hole| !played.contains(hole));
    let finished_at = if next_hole.is_none() { updated_at } else { None };

    BoardRow {
        scorecard_id: player.scorecard_id,
        name: player.name,
        gross,
        net,
        stableford: has_stableford.then_some(stableford_total),
        thru,
        hole: next_hole,
        last_under_par_at,
        finished_at,
        updated_at,
    }
}

/// Composite sort key; lower sorts first, missing metrics sort last.
fn sort_key(mode: &str, row: &BoardRow) -> (f64, f64, f64, f64, String) {
    let gross = metric(row.thru > 0, row.gross);
    let net = metric(row.thru > 0, row.net);
    let stableford = row
        .stableford
        .map(|points| -(points as f64))
        .unwrap_or(f64::INFINITY);
    let under_par = time_key(row.last_under_par_at);
    let finished = time_key(row.finished_at);
    let name = row.name.to_lowercase();

    match mode {
        "gross" => (gross, net, under_par, finished, name),
        "stableford" => (stableford, gross, under_par, finished, name),
        _ => (net, gross, under_par, finished, name),
    }
}

fn metric(present: bool, value: i64) -> f64 {
    if present { value as f64 } else { f64::INFINITY }
}

/// Earlier timestamps rank first; absent ones last.
fn time_key(at: Option<OffsetDateTime>) -> f64 {
    at.map(|at| at.unix_timestamp() as f64).unwrap_or(f64::INFINITY)
}
