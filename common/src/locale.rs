//! Locale-aware currency number formatting.
//!
//! Covers the locales the storefront ships with. Rules are keyed on the
//! language subtag of a BCP 47 tag such as `fr-TN`; unknown languages use
//! the English rules.

use rust_decimal::Decimal;

use crate::monetary::{Currency, Money};

const NBSP: char = '\u{a0}';
const NARROW_NBSP: char = '\u{202f}';

/// Where the currency symbol goes relative to the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolPlacement {
    /// `€85.00`
    Prefix,
    /// `R$ 85,00`
    PrefixSpaced,
    /// `85,00 €`
    SuffixSpaced,
}

/// Digit grouping and separator rules for one locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberLocale {
    tag: String,
    group_separator: char,
    decimal_separator: char,
    /// Size of the group closest to the decimal point.
    primary_group: usize,
    /// Size of every further group (2 for Indian-style grouping).
    secondary_group: usize,
    /// Integer digits needed before any grouping happens.
    min_grouping_digits: usize,
    placement: SymbolPlacement,
}

impl NumberLocale {
    /// Look up the rules for a locale tag.
    pub fn for_tag(tag: &str) -> Self {
        let language = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        let (group_separator, decimal_separator, placement) = match language.as_str() {
            "fr" => (NARROW_NBSP, ',', SymbolPlacement::SuffixSpaced),
            "de" | "es" | "it" | "ar" => ('.', ',', SymbolPlacement::SuffixSpaced),
            "ru" => (NBSP, ',', SymbolPlacement::SuffixSpaced),
            "pt" => ('.', ',', SymbolPlacement::PrefixSpaced),
            _ => (',', '.', SymbolPlacement::Prefix),
        };

        Self {
            tag: tag.to_string(),
            group_separator,
            decimal_separator,
            primary_group: 3,
            secondary_group: if language == "hi" { 2 } else { 3 },
            min_grouping_digits: if language == "es" { 5 } else { 4 },
            placement,
        }
    }

    /// The locale tag these rules were built for.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn placement(&self) -> SymbolPlacement {
        self.placement
    }

    /// Render a non-negative amount without any currency symbol.
    pub fn format_number(&self, value: Decimal, fraction_digits: u32) -> String {
        let rendered = format!("{:.*}", fraction_digits as usize, value);
        let (integer, fraction) = match rendered.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (rendered.as_str(), None),
        };

        let mut out = self.group_integer(integer);
        if let Some(fraction) = fraction {
            out.push(self.decimal_separator);
            out.push_str(fraction);
        }
        out
    }

    /// Render a money value with its symbol, rounded to the currency's minor units.
    pub fn format_money(&self, money: &Money, symbol: &str) -> String {
        let rounded = money.round();
        let number = self.format_number(rounded.value, money.currency.decimal_places());
        match self.placement {
            SymbolPlacement::Prefix => format!("{symbol}{number}"),
            SymbolPlacement::PrefixSpaced => format!("{symbol}{NBSP}{number}"),
            SymbolPlacement::SuffixSpaced => format!("{number}{NBSP}{symbol}"),
        }
    }

    /// Convenience wrapper for a bare amount and currency.
    pub fn format_currency(&self, value: Decimal, currency: &Currency, symbol: &str) -> String {
        self.format_money(&Money::new(value, currency.clone()), symbol)
    }

    fn group_integer(&self, digits: &str) -> String {
        if digits.len() < self.min_grouping_digits {
            return digits.to_string();
        }

        let mut groups: Vec<&str> = Vec::new();
        let mut end = digits.len();
        let mut size = self.primary_group;
        while end > size {
            groups.push(&digits[end - size..end]);
            end -= size;
            size = self.secondary_group;
        }
        groups.push(&digits[..end]);
        groups.reverse();

        let separator = self.group_separator.to_string();
        groups.join(&separator)
    }
}
