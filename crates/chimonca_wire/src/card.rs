//! Card DTOs and the six-slot field map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::instrument;

use crate::{CardId, GameCardId, WireError};

/// A card in the local player's hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandCard {
    /// Per-game card instance id (what submit requests carry).
    pub game_card_id: GameCardId,
    /// Catalog card id.
    pub card_id: CardId,
    /// Card title.
    pub title: String,
    /// Attack type label.
    pub attack_type: String,
    /// Grade label.
    pub grade: String,
    /// Power value.
    pub power: i32,
    /// Artwork reference.
    pub image_url: String,
}

/// A card occupying a field slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedCard {
    /// Per-game card instance id.
    pub game_card_id: GameCardId,
    /// Artwork reference.
    pub image_url: String,
    /// Face-up (`true`) or face-down.
    pub is_front: bool,
    /// Owned by the local player.
    pub is_mine: bool,
    /// Grade label, when revealed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    /// Power value, when revealed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<i32>,
    /// Attack type label, when revealed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<String>,
}

impl PlacedCard {
    /// Whether the local player may open the detail view of this card.
    ///
    /// Own cards are always inspectable; the opponent's only once face-up.
    pub fn can_inspect(&self) -> bool {
        self.is_mine || self.is_front
    }
}

/// Two field cards nominated for a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattlePair {
    /// First card.
    pub game_card_id1: GameCardId,
    /// Second card.
    pub game_card_id2: GameCardId,
}

/// One of the six field positions, numbered 1..=6 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter)]
pub enum SlotNumber {
    /// Slot 1.
    One,
    /// Slot 2.
    Two,
    /// Slot 3.
    Three,
    /// Slot 4.
    Four,
    /// Slot 5.
    Five,
    /// Slot 6.
    Six,
}

impl SlotNumber {
    /// Converts a wire number (1..=6) into a slot.
    pub fn from_number(number: u8) -> Option<Self> {
        Self::iter().nth(usize::from(number).checked_sub(1)?)
    }

    /// Wire number of this slot (1..=6).
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Zero-based array index.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for SlotNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Wire form of the field map: `{"1": card|null, ..., "6": card|null}`.
type RawFieldMap = BTreeMap<String, Option<PlacedCard>>;

/// Authoritative snapshot of the six field slots.
///
/// Pushes always carry a full map; the engine replaces its copy wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldMap", into = "RawFieldMap")]
pub struct FieldSlots {
    slots: [Option<PlacedCard>; 6],
}

impl FieldSlots {
    /// Creates an empty field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the card in the given slot.
    pub fn get(&self, slot: SlotNumber) -> Option<&PlacedCard> {
        self.slots[slot.index()].as_ref()
    }

    /// Places (or clears) a card in a slot, returning the builder.
    pub fn with(mut self, slot: SlotNumber, card: Option<PlacedCard>) -> Self {
        self.slots[slot.index()] = card;
        self
    }

    /// Iterates slots in order with their occupant.
    pub fn iter(&self) -> impl Iterator<Item = (SlotNumber, Option<&PlacedCard>)> {
        SlotNumber::iter().map(|slot| (slot, self.get(slot)))
    }

    /// Whether at least one slot is empty.
    pub fn has_empty_slot(&self) -> bool {
        self.slots.iter().any(Option::is_none)
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Finds a placed card by its game card id.
    #[instrument(skip(self))]
    pub fn find(&self, id: GameCardId) -> Option<(SlotNumber, &PlacedCard)> {
        self.iter()
            .find_map(|(slot, card)| card.filter(|c| c.game_card_id == id).map(|c| (slot, c)))
    }
}

impl TryFrom<RawFieldMap> for FieldSlots {
    type Error = WireError;

    fn try_from(raw: RawFieldMap) -> Result<Self, Self::Error> {
        let mut field = Self::new();
        for (key, card) in raw {
            let slot = key
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(SlotNumber::from_number)
                .ok_or_else(|| WireError::InvalidSlot(key.clone()))?;
            field.slots[slot.index()] = card;
        }
        Ok(field)
    }
}

impl From<FieldSlots> for RawFieldMap {
    fn from(field: FieldSlots) -> Self {
        SlotNumber::iter()
            .zip(field.slots)
            .map(|(slot, card)| (slot.number().to_string(), card))
            .collect()
    }
}
