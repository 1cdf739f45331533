//! Tropical sun sign lookup. Good enough for copy; the real chart comes from
//! the content generator.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SunSign {
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Fire,
    Earth,
    Air,
    Water,
}

// (month, first day of the next sign, sign until then)
const BOUNDARIES: [(i8, i8, SunSign, SunSign); 12] = [
    (1, 20, SunSign::Capricorn, SunSign::Aquarius),
    (2, 19, SunSign::Aquarius, SunSign::Pisces),
    (3, 21, SunSign::Pisces, SunSign::Aries),
    (4, 20, SunSign::Aries, SunSign::Taurus),
    (5, 21, SunSign::Taurus, SunSign::Gemini),
    (6, 21, SunSign::Gemini, SunSign::Cancer),
    (7, 23, SunSign::Cancer, SunSign::Leo),
    (8, 23, SunSign::Leo, SunSign::Virgo),
    (9, 23, SunSign::Virgo, SunSign::Libra),
    (10, 23, SunSign::Libra, SunSign::Scorpio),
    (11, 22, SunSign::Scorpio, SunSign::Sagittarius),
    (12, 22, SunSign::Sagittarius, SunSign::Capricorn),
];

pub fn sun_sign(month: i8, day: i8) -> SunSign {
    BOUNDARIES
        .iter()
        .find(|(m, _, _, _)| *m == month)
        .map(|(_, cusp, before, after)| if day < *cusp { *before } else { *after })
        .unwrap_or(SunSign::Capricorn)
}

impl SunSign {
    pub fn name(&self) -> &'static str {
        match self {
            SunSign::Aries => "Aries",
            SunSign::Taurus => "Taurus",
            SunSign::Gemini => "Gemini",
            SunSign::Cancer => "Cancer",
            SunSign::Leo => "Leo",
            SunSign::Virgo => "Virgo",
            SunSign::Libra => "Libra",
            SunSign::Scorpio => "Scorpio",
            SunSign::Sagittarius => "Sagittarius",
            SunSign::Capricorn => "Capricorn",
            SunSign::Aquarius => "Aquarius",
            SunSign::Pisces => "Pisces",
        }
    }

    pub fn element(&self) -> Element {
        match self {
            SunSign::Aries | SunSign::Leo | SunSign::Sagittarius => Element::Fire,
            SunSign::Taurus | SunSign::Virgo | SunSign::Capricorn => Element::Earth,
            SunSign::Gemini | SunSign::Libra | SunSign::Aquarius => Element::Air,
            SunSign::Cancer | SunSign::Scorpio | SunSign::Pisces => Element::Water,
        }
    }
}

impl fmt::Display for SunSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Element {
    pub fn name(&self) -> &'static str {
        match self {
            Element::Fire => "fire",
            Element::Earth => "earth",
            Element::Air => "air",
            Element::Water => "water",
        }
    }

    /// One-line temperament used when synthesizing fallback prose.
    pub fn temperament(&self) -> &'static str {
        match self {
            Element::Fire => "momentum, courage and a need to act on inspiration",
            Element::Earth => "patience, practical judgement and steady building",
            Element::Air => "curiosity, communication and a talent for connecting ideas",
            Element::Water => "intuition, emotional depth and loyalty to the people you love",
        }
    }
}
