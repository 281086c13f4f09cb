//! Discord webhook alert sink. Builds one embed per signal and posts it to
//! the configured webhook, honoring per-signal-type overrides.

use anyhow::Result;
use reqwest::Client;
use serde::Serialize;

use crate::config::Config;
use crate::models::{Direction, Signal, SignalDetails, SignalKind};
use crate::utils;

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// The structured record handed to the alert sink.
#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
    pub footer: EmbedFooter,
}

impl Embed {
    pub fn new(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color,
            fields: Vec::new(),
            timestamp: utils::now_iso(),
            footer: EmbedFooter {
                text: "Sharpline".to_string(),
            },
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = EmbedFooter { text: text.into() };
        self
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    embeds: [&'a Embed; 1],
}

fn market_name(market_key: &str) -> &str {
    match market_key {
        "spreads" => "Spread",
        "totals" => "Total",
        "h2h" => "Moneyline",
        other => other,
    }
}

fn strength_bar(strength: f64) -> String {
    let filled = (strength * 10.0).round().clamp(0.0, 10.0) as usize;
    format!(
        "`{}{}` **{:.0}%**",
        "█".repeat(filled),
        "░".repeat(10 - filled),
        strength * 100.0
    )
}

fn format_line_value(point: Option<f64>, price: Option<f64>, market_key: &str) -> String {
    if market_key == "h2h" {
        if let Some(price) = price {
            return format!("{price:+.0}");
        }
    }
    if let Some(point) = point {
        return format!("{point}");
    }
    match price {
        Some(price) => format!("{price:+.0}"),
        None => "?".to_string(),
    }
}

pub struct Alerter {
    client: Client,
    default_url: String,
    steam_move_url: Option<String>,
    rapid_change_url: Option<String>,
    pinnacle_divergence_url: Option<String>,
    reverse_line_url: Option<String>,
    exchange_shift_url: Option<String>,
}

impl Alerter {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            default_url: config.discord_webhook_url.clone(),
            steam_move_url: config.discord_webhook_steam_move.clone(),
            rapid_change_url: config.discord_webhook_rapid_change.clone(),
            pinnacle_divergence_url: config.discord_webhook_pinnacle_divergence.clone(),
            reverse_line_url: config.discord_webhook_reverse_line.clone(),
            exchange_shift_url: config.discord_webhook_exchange_shift.clone(),
        }
    }

    fn webhook_for(&self, kind: SignalKind) -> &str {
        let override_url = match kind {
            SignalKind::SteamMove => &self.steam_move_url,
            SignalKind::RapidChange => &self.rapid_change_url,
            SignalKind::PinnacleDivergence => &self.pinnacle_divergence_url,
            SignalKind::ReverseLine => &self.reverse_line_url,
            SignalKind::ExchangeShift => &self.exchange_shift_url,
        };
        override_url.as_deref().unwrap_or(&self.default_url)
    }

    /// Dispatch one signal. Returns true when the webhook did not reject the
    /// alert (any non-4xx response counts as delivered).
    pub async fn send_signal(&self, sig: &Signal) -> Result<bool> {
        let embed = build_signal_embed(sig);
        self.post_embed(self.webhook_for(sig.kind()), &embed).await
    }

    /// Post an embed to the default webhook (reports, budget warnings).
    pub async fn send_embed(&self, embed: &Embed) -> Result<bool> {
        self.post_embed(&self.default_url, embed).await
    }

    pub async fn post_embed(&self, url: &str, embed: &Embed) -> Result<bool> {
        let payload = WebhookPayload { embeds: [embed] };
        let resp = self.client.post(url).json(&payload).send().await?;
        let status = resp.status();
        if status.is_client_error() {
            tracing::error!(status = %status, "discord webhook rejected embed");
            return Ok(false);
        }
        Ok(true)
    }
}

pub fn build_signal_embed(sig: &Signal) -> Embed {
    let kind = sig.kind();
    let matchup = format!("{} @ {}", sig.away_team, sig.home_team);
    let market = market_name(&sig.market_key);

    let mut embed = Embed::new(kind.label(), build_description(sig, &matchup, market), kind.color())
        .field("Strength", strength_bar(sig.strength), false)
        .footer(format!(
            "Sharpline • {}",
            title_case(&sig.sport_key.replace('_', " "))
        ));

    match &sig.details {
        SignalDetails::SteamMove { book_details, .. } if !book_details.is_empty() => {
            let lines: Vec<String> = book_details
                .iter()
                .map(|b| format!("`{:15}` **{:+.1}**", title_case(&b.bookmaker), b.delta))
                .collect();
            embed = embed.field("Book Movements", lines.join("\n"), false);
        }
        SignalDetails::ReverseLine { us_movers, .. } if !us_movers.is_empty() => {
            let movers: Vec<String> = us_movers.iter().map(|m| title_case(m)).collect();
            embed = embed.field("US Books Moving", movers.join(", "), false);
        }
        _ => {}
    }

    embed
}

fn build_description(sig: &Signal, matchup: &str, market: &str) -> String {
    let mut lines = vec![format!("**{matchup}**"), String::new()];

    match &sig.details {
        SignalDetails::RapidChange {
            bookmaker,
            old_price,
            new_price,
            old_point,
            new_point,
            delta,
            ..
        } => {
            let old_val = format_line_value(*old_point, Some(*old_price), &sig.market_key);
            let new_val = format_line_value(*new_point, Some(*new_price), &sig.market_key);
            lines.push(format!("📊 **{market}** — {}", sig.outcome_name));
            lines.push(format!("## {old_val}  →  {new_val}"));
            lines.push(format!("**Delta: {delta:+.1}** at {}", title_case(bookmaker)));
        }
        SignalDetails::SteamMove {
            direction,
            books_moved,
            avg_delta,
            ..
        } => {
            let arrow = if *direction == Direction::Up { "📈" } else { "📉" };
            lines.push(format!("{arrow} **{market}** — {}", sig.outcome_name));
            lines.push(format!("## {books_moved} books moved {direction}"));
            lines.push(format!("**Avg delta: {avg_delta:+.1}**"));
        }
        SignalDetails::PinnacleDivergence {
            us_book,
            us_value,
            pinnacle_value,
            delta,
            ..
        } => {
            let us_book = title_case(us_book);
            lines.push(format!("💰 **{market}** — {}", sig.outcome_name));
            lines.push(format!("## {us_book}: {us_value}  vs  Pinnacle: {pinnacle_value}"));
            lines.push(format!("**Value edge: {delta:+.2}** — bet at {us_book}"));
        }
        SignalDetails::ReverseLine {
            us_direction,
            us_avg_delta,
            pinnacle_direction,
            pinnacle_delta,
            ..
        } => {
            lines.push(format!("🔄 **{market}** — {}", sig.outcome_name));
            lines.push(format!(
                "## US {us_direction} ({us_avg_delta:+.1})  vs  Pinnacle {pinnacle_direction} ({pinnacle_delta:+.1})"
            ));
            lines.push("**Public vs Sharp money divergence**".to_string());
        }
        SignalDetails::ExchangeShift {
            old_implied_prob,
            new_implied_prob,
            shift,
            direction,
            ..
        } => {
            lines.push(format!("📉 **{market}** — {} ({direction})", sig.outcome_name));
            lines.push(format!(
                "## {:.1}%  →  {:.1}%",
                old_implied_prob * 100.0,
                new_implied_prob * 100.0
            ));
            lines.push(format!("**Betfair shift: {:+.1}%**", shift * 100.0));
        }
    }

    lines.join("\n")
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookMove;

    fn steam_signal() -> Signal {
        Signal {
            event_id: "evt".to_string(),
            sport_key: "basketball_nba".to_string(),
            home_team: "Lakers".to_string(),
            away_team: "Celtics".to_string(),
            market_key: "spreads".to_string(),
            outcome_name: "Lakers".to_string(),
            strength: 0.75,
            description: String::new(),
            details: SignalDetails::SteamMove {
                direction: Direction::Down,
                books_moved: 3,
                avg_delta: 0.5,
                book_details: vec![BookMove {
                    bookmaker: "draftkings".to_string(),
                    delta: -0.5,
                    price: Some(-110.0),
                    point: Some(-4.0),
                }],
                value_books: vec![],
            },
        }
    }

    #[test]
    fn test_signal_embed_shape() {
        let embed = build_signal_embed(&steam_signal());
        assert_eq!(embed.title, "Steam Move");
        assert_eq!(embed.color, 0xFF4500);
        assert!(embed.description.contains("Celtics @ Lakers"));
        assert!(embed.description.contains("3 books moved down"));
        assert_eq!(embed.fields[0].name, "Strength");
        assert!(embed.fields[0].value.contains("75%"));
        assert_eq!(embed.fields[1].name, "Book Movements");
        assert!(embed.footer.text.contains("Basketball Nba"));
    }

    #[test]
    fn test_strength_bar_render() {
        assert!(strength_bar(1.0).contains("██████████"));
        assert!(strength_bar(0.0).contains("░░░░░░░░░░"));
        let half = strength_bar(0.5);
        assert!(half.contains("█████░░░░░"));
        assert!(half.contains("50%"));
    }

    #[test]
    fn test_format_line_value() {
        assert_eq!(format_line_value(None, Some(-150.0), "h2h"), "-150");
        assert_eq!(format_line_value(None, Some(130.0), "h2h"), "+130");
        assert_eq!(format_line_value(Some(-3.5), Some(-110.0), "spreads"), "-3.5");
        assert_eq!(format_line_value(None, None, "spreads"), "?");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("draftkings"), "Draftkings");
        assert_eq!(title_case("basketball nba"), "Basketball Nba");
    }
}
