//! Core types for cardgraph.
//!
//! Decks arrive from external export tooling as loosely-typed `DeckRecord`s.
//! Validation turns them into `Deck`s, which the graph store ingests one at a
//! time. Card identity is always `(game, name)`: the same name under two games
//! is two different cards, and the game tag is a required input, never
//! inferred from the card name.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::GraphError;

/// Serde helpers for Arc<str> fields
pub(crate) mod arc_str_serde {
    use super::*;

    pub fn serialize<S>(arc: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(arc.as_ref())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.into())
    }
}

/// Supported card games.
///
/// Serialized as the short code used throughout persisted graphs ("MTG",
/// "PKM", ...). Parsing also accepts the long names export tooling emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Game {
    #[serde(rename = "MTG", alias = "magic", alias = "mtg")]
    Magic,
    #[serde(rename = "PKM", alias = "pokemon", alias = "pkm")]
    Pokemon,
    #[serde(rename = "YGO", alias = "yugioh", alias = "ygo")]
    Yugioh,
    #[serde(rename = "DGM", alias = "digimon", alias = "dgm")]
    Digimon,
    #[serde(rename = "RFB", alias = "riftbound", alias = "rfb")]
    Riftbound,
}

impl Game {
    pub const ALL: [Game; 5] = [
        Game::Magic,
        Game::Pokemon,
        Game::Yugioh,
        Game::Digimon,
        Game::Riftbound,
    ];

    /// Short code used in storage keys and exports.
    pub fn code(self) -> &'static str {
        match self {
            Game::Magic => "MTG",
            Game::Pokemon => "PKM",
            Game::Yugioh => "YGO",
            Game::Digimon => "DGM",
            Game::Riftbound => "RFB",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Game {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mtg" | "magic" | "magic: the gathering" => Ok(Game::Magic),
            "pkm" | "pokemon" | "ptcg" => Ok(Game::Pokemon),
            "ygo" | "yugioh" | "yu-gi-oh" | "yu-gi-oh!" => Ok(Game::Yugioh),
            "dgm" | "digimon" => Ok(Game::Digimon),
            "rfb" | "riftbound" => Ok(Game::Riftbound),
            _ => Err(GraphError::UnknownGame(s.to_string())),
        }
    }
}

/// Identity of a card node: (game, name).
///
/// Ordering is by game, then name, which gives exports and query results a
/// stable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CardKey {
    pub game: Game,
    #[serde(with = "arc_str_serde")]
    pub name: Arc<str>,
}

impl CardKey {
    pub fn new(game: Game, name: impl Into<Arc<str>>) -> Self {
        Self {
            game,
            name: name.into(),
        }
    }

    /// Parse the `GAME:name` form produced by `Display`.
    ///
    /// Game codes never contain ':', so the first colon is the separator even
    /// when the card name itself contains colons.
    pub fn parse(s: &str) -> Option<Self> {
        let (game, name) = s.split_once(':')?;
        if name.is_empty() {
            return None;
        }
        Some(Self::new(game.parse().ok()?, name))
    }
}

impl fmt::Display for CardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.game, self.name)
    }
}

/// One card line inside a deck partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckCard {
    pub name: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

/// A named section of a deck ("Main", "Sideboard", "Extra", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckPartition {
    #[serde(default = "default_partition")]
    pub name: String,
    #[serde(default)]
    pub cards: Vec<DeckCard>,
}

fn default_partition() -> String {
    "Main".to_string()
}

/// Tournament annotations for a deck.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    /// Final standing at the event (1 = winner)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
}

impl DeckMetadata {
    /// Fill fields missing here from `fallback`.
    pub fn or(self, fallback: &DeckMetadata) -> DeckMetadata {
        DeckMetadata {
            format: self.format.or_else(|| fallback.format.clone()),
            archetype: self.archetype.or_else(|| fallback.archetype.clone()),
            placement: self.placement.or(fallback.placement),
            event_date: self.event_date.or_else(|| fallback.event_date.clone()),
        }
    }

    /// Event date, ignoring blank values.
    pub fn event_date(&self) -> Option<&str> {
        non_blank(self.event_date.as_deref())
    }

    /// Format name, ignoring blank values.
    pub fn format(&self) -> Option<&str> {
        non_blank(self.format.as_deref())
    }

    /// Archetype name, ignoring blank values.
    pub fn archetype(&self) -> Option<&str> {
        non_blank(self.archetype.as_deref())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Per-card totals within one deck.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardTally {
    /// Copies summed over all partitions
    pub count: u32,
    /// Partitions the card appeared in
    pub partitions: BTreeSet<String>,
}

/// A validated deck, ready for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub game: Game,
    pub metadata: DeckMetadata,
    pub partitions: Vec<DeckPartition>,
}

impl Deck {
    pub fn new(game: Game) -> Self {
        Self {
            game,
            metadata: DeckMetadata::default(),
            partitions: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.metadata.format = Some(format.into());
        self
    }

    pub fn with_archetype(mut self, archetype: impl Into<String>) -> Self {
        self.metadata.archetype = Some(archetype.into());
        self
    }

    pub fn with_partition<'a>(
        mut self,
        name: impl Into<String>,
        cards: impl IntoIterator<Item = (&'a str, u32)>,
    ) -> Self {
        self.partitions.push(DeckPartition {
            name: name.into(),
            cards: cards
                .into_iter()
                .map(|(name, count)| DeckCard {
                    name: name.to_string(),
                    count,
                })
                .collect(),
        });
        self
    }

    /// Sum copies per distinct card across partitions.
    ///
    /// Blank names and zero counts are dropped. A card listed in both main
    /// and sideboard contributes its combined count and both partition labels.
    pub fn card_tallies(&self) -> BTreeMap<String, CardTally> {
        let mut tallies: BTreeMap<String, CardTally> = BTreeMap::new();
        for partition in &self.partitions {
            for card in &partition.cards {
                let name = card.name.trim();
                if name.is_empty() || card.count == 0 {
                    continue;
                }
                let tally = tallies.entry(name.to_string()).or_default();
                tally.count = tally.count.saturating_add(card.count);
                tally.partitions.insert(partition.name.clone());
            }
        }
        tallies
    }
}

/// Raw deck record as produced by export tooling (one JSON object per line).
///
/// Every field is optional at the serde level so that a record with missing
/// fields can be reported and skipped instead of aborting a whole batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeckRecord {
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub deck_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<Vec<DeckPartition>>,
}

/// A record that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDeck {
    pub deck_id: String,
    pub timestamp: DateTime<Utc>,
    pub deck: Deck,
}

impl DeckRecord {
    /// Check required fields and build a `Deck`.
    pub fn validate(self) -> Result<ValidDeck, GraphError> {
        let deck_id = match self.deck_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(GraphError::malformed(None, "missing deck_id")),
        };
        let id = Some(deck_id.as_str());

        let raw_game = self
            .game
            .as_deref()
            .ok_or_else(|| GraphError::malformed(id, "missing game"))?;
        let game: Game = raw_game
            .parse()
            .map_err(|_| GraphError::malformed(id, format!("unknown game '{raw_game}'")))?;

        let raw_ts = self
            .timestamp
            .as_deref()
            .ok_or_else(|| GraphError::malformed(id, "missing timestamp"))?;
        let timestamp = parse_timestamp(raw_ts)
            .ok_or_else(|| GraphError::malformed(id, format!("invalid timestamp '{raw_ts}'")))?;

        let partitions = self
            .partitions
            .ok_or_else(|| GraphError::malformed(id, "missing partitions"))?;

        Ok(ValidDeck {
            deck_id,
            timestamp,
            deck: Deck {
                game,
                metadata: DeckMetadata {
                    format: self.format,
                    archetype: self.archetype,
                    placement: self.placement,
                    event_date: self.event_date,
                },
                partitions,
            },
        })
    }
}

/// Parse an ingestion timestamp.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC) and bare
/// `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Calendar-month bucket key ("YYYY-MM") for a timestamp.
pub fn month_key(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m").to_string()
}

/// First day of the month named by a "YYYY-MM" key.
pub fn parse_month_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d").ok()
}
