// src/analysis/plate_normalizer.rs
//
// Repairs raw recognizer output into a canonical plate code.
//
// Recognition engines routinely confuse glyphs that look alike (0/O, 1/I,
// 8/B, ...). Since every position of a plate has a known type, a digit in a
// letter slot (or the reverse) can be mapped back through a fixed confusion
// table. Anything the table cannot repair is rejected, never guessed.

use crate::types::{NormalizerConfig, RecognitionResult};
use tracing::debug;

// ============================================================================
// GRAMMAR
// ============================================================================

/// Characters the recognizer is allowed to produce
pub const PLATE_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Letter,
    Digit,
}

impl SlotKind {
    fn accepts(self, c: char) -> bool {
        match self {
            Self::Letter => c.is_ascii_uppercase(),
            Self::Digit => c.is_ascii_digit(),
        }
    }
}

/// Fixed-length letter/digit pattern a plate code must satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateGrammar {
    slots: Vec<SlotKind>,
}

impl PlateGrammar {
    /// Mercosur layout `LLL#L##`: letters at 0,1,2,4 and digits at 3,5,6
    pub fn mercosur() -> Self {
        use SlotKind::{Digit, Letter};
        Self {
            slots: vec![Letter, Letter, Letter, Digit, Letter, Digit, Digit],
        }
    }

    /// `L` marks a letter slot and `D` a digit slot, e.g. `"LLLDDDD"`.
    pub fn parse(pattern: &str) -> Option<Self> {
        let slots = pattern
            .chars()
            .map(|c| match c {
                'L' => Some(SlotKind::Letter),
                'D' => Some(SlotKind::Digit),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        if slots.is_empty() {
            return None;
        }
        Some(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, idx: usize) -> Option<SlotKind> {
        self.slots.get(idx).copied()
    }

    pub fn matches(&self, code: &str) -> bool {
        code.chars().count() == self.slots.len()
            && code
                .chars()
                .zip(&self.slots)
                .all(|(c, slot)| slot.accepts(c))
    }

    /// First index where a letter slot is followed by a digit slot.
    fn letter_digit_boundary(&self) -> Option<usize> {
        self.slots
            .windows(2)
            .position(|w| w[0] == SlotKind::Letter && w[1] == SlotKind::Digit)
            .map(|i| i + 1)
    }
}

impl Default for PlateGrammar {
    fn default() -> Self {
        Self::mercosur()
    }
}

// ============================================================================
// CONFUSION TABLE
// ============================================================================

/// Digits read where a letter belongs
const DIGIT_AS_LETTER: &[(char, char)] = &[
    ('0', 'O'),
    ('1', 'I'),
    ('4', 'A'),
    ('5', 'S'),
    ('6', 'G'),
    ('8', 'B'),
];

/// Letters read where a digit belongs
const LETTER_AS_DIGIT: &[(char, char)] = &[
    ('O', '0'),
    ('Q', '0'),
    ('I', '1'),
    ('L', '1'),
    ('S', '5'),
    ('G', '6'),
    ('B', '8'),
];

/// Leading glyphs that are usually a plate border or bolt read as a character
const STRAY_LEADING: &[char] = &['I', '1', 'L'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionTable {
    digit_as_letter: Vec<(char, char)>,
    letter_as_digit: Vec<(char, char)>,
}

impl ConfusionTable {
    pub fn new(digit_as_letter: &[(char, char)], letter_as_digit: &[(char, char)]) -> Self {
        Self {
            digit_as_letter: digit_as_letter.to_vec(),
            letter_as_digit: letter_as_digit.to_vec(),
        }
    }

    pub fn standard() -> Self {
        Self::new(DIGIT_AS_LETTER, LETTER_AS_DIGIT)
    }

    pub fn to_letter(&self, c: char) -> Option<char> {
        lookup(&self.digit_as_letter, c)
    }

    pub fn to_digit(&self, c: char) -> Option<char> {
        lookup(&self.letter_as_digit, c)
    }

    pub fn entries(&self) -> impl Iterator<Item = (char, char)> + '_ {
        self.digit_as_letter
            .iter()
            .chain(self.letter_as_digit.iter())
            .copied()
    }

    fn correct(&self, c: char, slot: SlotKind) -> char {
        if slot.accepts(c) {
            return c;
        }
        let fixed = match slot {
            SlotKind::Letter => self.to_letter(c),
            SlotKind::Digit => self.to_digit(c),
        };
        fixed.unwrap_or(c)
    }

    /// A letter no entry would turn into a digit
    fn is_unambiguous_letter(&self, c: char) -> bool {
        c.is_ascii_uppercase() && self.to_digit(c).is_none()
    }

    /// A digit no entry would turn into a letter
    fn is_unambiguous_digit(&self, c: char) -> bool {
        c.is_ascii_digit() && self.to_letter(c).is_none()
    }
}

impl Default for ConfusionTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn lookup(table: &[(char, char)], c: char) -> Option<char> {
    table.iter().find(|(from, _)| *from == c).map(|(_, to)| *to)
}

// ============================================================================
// NORMALIZER
// ============================================================================

pub struct PlateNormalizer {
    grammar: PlateGrammar,
    table: ConfusionTable,
    shift_heuristic: bool,
}

impl PlateNormalizer {
    pub fn new(grammar: PlateGrammar, table: ConfusionTable, config: &NormalizerConfig) -> Self {
        Self {
            grammar,
            table,
            shift_heuristic: config.shift_heuristic,
        }
    }

    pub fn grammar(&self) -> &PlateGrammar {
        &self.grammar
    }

    /// Canonical code, or `None` when the text cannot be repaired.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let cleaned: Vec<char> = raw
            .chars()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| PLATE_ALPHABET.contains(*c))
            .collect();

        let target = self.grammar.len();
        if cleaned.len() < target {
            debug!("Plate text '{}' too short after cleanup", raw);
            return None;
        }

        let start = if cleaned.len() > target && self.looks_shifted(&cleaned) {
            debug!("Dropping stray leading '{}' from '{}'", cleaned[0], raw);
            1
        } else {
            0
        };

        let corrected: String = cleaned[start..start + target]
            .iter()
            .enumerate()
            .map(|(i, &c)| match self.grammar.slot(i) {
                Some(slot) => self.table.correct(c, slot),
                None => c,
            })
            .collect();

        if self.grammar.matches(&corrected) {
            Some(corrected)
        } else {
            debug!("Plate text '{}' -> '{}' fails grammar", raw, corrected);
            None
        }
    }

    /// Build the full recognition record for one recognizer read.
    pub fn recognize(&self, raw_text: &str, confidence: f32) -> RecognitionResult {
        match self.normalize(raw_text) {
            Some(code) => RecognitionResult {
                raw_text: raw_text.to_string(),
                processed_text: code,
                confidence,
                is_valid: true,
            },
            None => RecognitionResult::invalid(raw_text, confidence),
        }
    }

    // The text reads one position late: the char sitting on the grammar's
    // letter->digit boundary is clearly a letter and the next clearly a digit.
    fn looks_shifted(&self, cleaned: &[char]) -> bool {
        if !self.shift_heuristic || !STRAY_LEADING.contains(&cleaned[0]) {
            return false;
        }
        let Some(boundary) = self.grammar.letter_digit_boundary() else {
            return false;
        };
        match (cleaned.get(boundary), cleaned.get(boundary + 1)) {
            (Some(&a), Some(&b)) => {
                self.table.is_unambiguous_letter(a) && self.table.is_unambiguous_digit(b)
            }
            _ => false,
        }
    }
}

impl Default for PlateNormalizer {
    fn default() -> Self {
        Self::new(
            PlateGrammar::mercosur(),
            ConfusionTable::standard(),
            &NormalizerConfig::default(),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> Option<String> {
        PlateNormalizer::default().normalize(raw)
    }

    #[test]
    fn test_canonical_code_unchanged() {
        for code in ["POX4G21", "ABC1D23", "XYZ9Q99", "GTT0F37"] {
            assert_eq!(norm(code).as_deref(), Some(code));
        }
    }

    #[test]
    fn test_zero_in_letter_slot_becomes_o() {
        assert_eq!(norm("P0X4G21").as_deref(), Some("POX4G21"));
    }

    #[test]
    fn test_letters_in_digit_slots() {
        assert_eq!(norm("ABCOD1S").as_deref(), Some("ABC0D15"));
        assert_eq!(norm("ABCQDLG").as_deref(), Some("ABC0D16"));
        assert_eq!(norm("8C4IDB2").as_deref(), Some("BCA1D82"));
    }

    #[test]
    fn test_cleanup_uppercases_and_strips() {
        assert_eq!(norm(" pox-4g21\n").as_deref(), Some("POX4G21"));
        assert_eq!(norm("P.O.X 4 G.2.1").as_deref(), Some("POX4G21"));
    }

    #[test]
    fn test_too_short_is_rejected() {
        assert_eq!(norm("AB"), None);
        assert_eq!(norm(""), None);
        assert_eq!(norm("--##--"), None);
    }

    #[test]
    fn test_unmappable_char_is_rejected() {
        // '2' in a letter slot has no table entry
        assert_eq!(norm("A2C4D56"), None);
        // 'X' in a digit slot has no table entry
        assert_eq!(norm("ABCXD56"), None);
    }

    #[test]
    fn test_long_text_truncates() {
        assert_eq!(norm("ABC1D234").as_deref(), Some("ABC1D23"));
    }

    #[test]
    fn test_shift_drops_stray_leading_char() {
        assert_eq!(norm("IABC2D37").as_deref(), Some("ABC2D37"));
        assert_eq!(norm("1XYZ7K99").as_deref(), Some("XYZ7K99"));
    }

    #[test]
    fn test_shift_needs_unambiguous_evidence() {
        // '4' could also be an 'A', so no shift; truncation leaves 'X' in a digit slot
        assert_eq!(norm("IPOX4G21"), None);
        // leading char not a known artifact
        assert_eq!(norm("MABC2D37"), None);
    }

    #[test]
    fn test_shift_can_be_disabled() {
        let n = PlateNormalizer::new(
            PlateGrammar::mercosur(),
            ConfusionTable::standard(),
            &NormalizerConfig {
                shift_heuristic: false,
                ..Default::default()
            },
        );
        assert_eq!(n.normalize("IABC2D37"), None);
    }

    #[test]
    fn test_output_is_empty_or_grammatical() {
        let n = PlateNormalizer::default();
        let inputs = [
            "", "A", "P0X4G21", "0000000", "OOOOOOO", "ABCDEFG", "1234567", "I1L5S8B",
            "ZZZ9Z99", "abc1d23", "A-B-C-1", "IABC2D37EXTRA", "QQQ0Q00", "8888888",
        ];
        for raw in inputs {
            let r = n.recognize(raw, 0.5);
            if r.is_valid {
                assert!(
                    n.grammar().matches(&r.processed_text),
                    "'{}' produced ungrammatical '{}'",
                    raw,
                    r.processed_text
                );
            } else {
                assert!(r.processed_text.is_empty(), "'{}' leaked partial text", raw);
            }
        }
    }

    #[test]
    fn test_table_entries_cross_classes() {
        let table = ConfusionTable::standard();
        for (from, to) in DIGIT_AS_LETTER {
            assert!(from.is_ascii_digit() && to.is_ascii_uppercase());
            assert_eq!(table.to_letter(*from), Some(*to));
        }
        for (from, to) in LETTER_AS_DIGIT {
            assert!(from.is_ascii_uppercase() && to.is_ascii_digit());
            assert_eq!(table.to_digit(*from), Some(*to));
        }
        assert_eq!(table.entries().count(), 13);
    }

    #[test]
    fn test_every_digit_entry_repairs_a_letter_slot() {
        let n = PlateNormalizer::default();
        for (digit, letter) in DIGIT_AS_LETTER {
            let raw = format!("{}BC1D23", digit);
            assert_eq!(n.normalize(&raw), Some(format!("{}BC1D23", letter)));
        }
        for (letter, digit) in LETTER_AS_DIGIT {
            let raw = format!("ABC1D2{}", letter);
            assert_eq!(n.normalize(&raw), Some(format!("ABC1D2{}", digit)));
        }
    }

    #[test]
    fn test_custom_grammar() {
        let grammar = PlateGrammar::parse("LLLDDDD").unwrap();
        let n = PlateNormalizer::new(grammar, ConfusionTable::standard(), &NormalizerConfig::default());
        assert_eq!(n.normalize("ABC12O4").as_deref(), Some("ABC1204"));
        assert!(PlateGrammar::parse("LLX").is_none());
        assert!(PlateGrammar::parse("").is_none());
    }

    #[test]
    fn test_recognize_builds_result() {
        let n = PlateNormalizer::default();
        let ok = n.recognize("P0X4G21", 0.8);
        assert!(ok.is_valid);
        assert_eq!(ok.raw_text, "P0X4G21");
        assert_eq!(ok.processed_text, "POX4G21");

        let bad = n.recognize("AB", 0.8);
        assert!(!bad.is_valid);
        assert!(bad.processed_text.is_empty());
    }
}
