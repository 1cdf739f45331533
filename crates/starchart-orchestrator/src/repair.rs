//! Local repair of generated content that is short or incomplete.
//!
//! Repairs never call the generator. Synthesized prose is built from the
//! person's name, sun sign, element and birth place so it still reads as
//! written for them. Enrichment draws on a fixed pool of paragraphs, so a
//! report far below its word floor stays below it and is delivered at LOW
//! quality.

use starchart_core::models::input::NormalizedInput;
use starchart_core::models::report::{Quality, ReportContent, ReportSection};
use starchart_core::models::report_type::{ReportType, section_title};

use crate::validation::find_placeholder;

pub const LOW_QUALITY_DISCLAIMER: &str = "This report did not meet our usual standard for \
length and depth. It is provided as-is and you have not been charged for it.";

/// Sections used to reach the minimum count once every required section
/// is present.
const EXTRA_SECTIONS: &[&str] = &["reflection", "practical-steps", "looking-ahead"];

struct Persona<'a> {
    first_name: &'a str,
    sign: &'static str,
    element: &'static str,
    temperament: &'static str,
    place: &'a str,
}

impl<'a> Persona<'a> {
    fn new(input: &'a NormalizedInput) -> Self {
        let sign = input.sun_sign();
        Self {
            first_name: input.first_name(),
            sign: sign.name(),
            element: sign.element().name(),
            temperament: sign.element().temperament(),
            place: &input.birth_place,
        }
    }
}

fn section_body(key: &str, p: &Persona<'_>) -> String {
    let Persona {
        first_name,
        sign,
        element,
        temperament,
        place,
    } = p;
    match key {
        "overview" => format!(
            "{first_name}, your chart is anchored by the Sun in {sign}, a {element} sign that \
             brings {temperament}. Born in {place}, you carry that signature into every area \
             of life. The themes below show where this energy flows most easily and where it \
             asks for patience, so you can work with your nature rather than against it."
        ),
        "strengths" => format!(
            "Your greatest strengths grow out of {sign}'s {element} nature: {temperament}. \
             People around you notice these qualities before you do. When you lean into them \
             deliberately, {first_name}, they become reliable tools instead of happy accidents, \
             and they carry you through the seasons when motivation runs low."
        ),
        "guidance" | "recommendation" => format!(
            "The clearest guidance for you, {first_name}, is to trust the {element} rhythm of \
             your chart. Move when you feel the pull, rest when the pull fades, and measure \
             progress over months rather than days. {sign} placements reward consistency, and \
             small steady choices will compound into the change you are looking for."
        ),
        "career" => format!(
            "In work, your {sign} Sun looks for a role that uses {temperament}. You do your best \
             work where your contribution is visible and your pace is respected. {first_name}, \
             consider which parts of your current path already feel natural, and build from \
             those before reaching for something entirely new."
        ),
        "money" => format!(
            "With money, the {element} element shapes your instincts. You earn most comfortably \
             when income is tied to something you care about, and you keep it when your \
             spending reflects your values rather than your mood. A simple plan, reviewed each \
             season, suits {sign} far better than rigid rules."
        ),
        "timing" => format!(
            "Timing matters for you, {first_name}. The months around your birthday tend to open \
             new chapters, while the period six months later is better for finishing and \
             consolidating. Saturn and Jupiter cycles mark the larger turning points, and \
             noticing them helps you act when conditions are on your side."
        ),
        "attraction" => format!(
            "You are drawn to people who match the {element} tempo of your chart. With your Sun \
             in {sign}, attraction begins with {temperament}, and it deepens when someone \
             meets you there. {first_name}, the connections that last are the ones where you \
             feel both seen and free to grow."
        ),
        "partnership" => format!(
            "In partnership you need space for {temperament}. The best relationships for a \
             {sign} give you steady reassurance without asking you to become smaller. Shared \
             plans, honest conversation and small daily rituals matter more to you than grand \
             gestures, and they build the security you value."
        ),
        "relationships" => format!(
            "Your relationships reflect the {element} element at the heart of your chart. You \
             offer {temperament}, and you flourish with people who return it. {first_name}, \
             friendships and partnerships formed through shared purpose tend to outlast those \
             built on circumstance alone."
        ),
        "challenges" => format!(
            "Every {sign} chart carries its own tension. For you it shows up when {temperament} \
             is pushed too far or ignored for too long. Recognizing the early signs, such as \
             restlessness, withdrawal or impatience, gives you time to rebalance before small \
             frictions grow into larger patterns."
        ),
        "options" => format!(
            "Looking at the choice in front of you, {first_name}, weigh each option against the \
             {element} needs of your chart. The path that allows {temperament} will feel \
             lighter over time, even if it looks harder at first. Write down what each option \
             asks of you and what it gives back."
        ),
        "personality" => format!(
            "At your core you are a {sign}, shaped by {temperament}. Born in {place}, you bring \
             a particular blend of warmth and resolve to the people and places around you. You \
             are at your best when your daily life leaves room for the {element} side of your \
             nature to breathe."
        ),
        "health" => format!(
            "Your vitality follows the {element} element. Routines that honour {temperament} keep \
             your energy steady, while long stretches of the opposite drain it. {first_name}, \
             regular movement, enough sleep and time outdoors do more for a {sign} than any \
             single dramatic change."
        ),
        other => match other.strip_prefix("quarter-") {
            Some(n) => format!(
                "Quarter {n} brings a distinct chapter for you, {first_name}. The transits of \
                 this period favour {temperament}, so plan your most important moves for the \
                 weeks when you feel that energy rising. Use the quieter weeks to review, \
                 adjust and prepare, in keeping with the {element} rhythm of your {sign} Sun."
            ),
            None => format!(
                "{first_name}, this part of your chart adds depth to the picture. With the Sun \
                 in {sign} and roots in {place}, you meet life with {temperament}. Take a moment \
                 to notice where this already shows up for you, and where a little more of it \
                 would make the coming months easier."
            ),
        },
    }
}

fn enrichment_pool(p: &Persona<'_>) -> Vec<String> {
    let Persona {
        first_name,
        sign,
        element,
        temperament,
        place,
    } = p;
    vec![
        format!(
            "It also helps to remember that your chart describes tendencies rather than fixed \
             outcomes. {first_name}, the {element} qualities in your {sign} Sun give you a \
             starting point, and the choices you make each week decide how those qualities \
             express themselves."
        ),
        format!(
            "Many people with a {sign} Sun find that their best decisions come after a short \
             pause. Giving yourself a day to let a first reaction settle allows {temperament} to \
             guide you instead of hurry or pressure from others."
        ),
        format!(
            "Your birthplace, {place}, is part of the story too. The sky above it at the moment \
             you were born sets the houses of your chart, and many people feel a renewed sense \
             of direction when they return to the landscapes that shaped them early on."
        ),
        format!(
            "Keep a simple record of the moments when you feel most like yourself. Over a few \
             months, patterns will appear, and you will see how closely they follow the {element} \
             themes described here. That record becomes your own guide, {first_name}."
        ),
        format!(
            "Finally, be generous with yourself during slower periods. A {sign} does not need \
             to be in constant motion to make progress. Rest, reflection and small acts of care \
             are part of the cycle, and they prepare the ground for the next season of growth."
        ),
        format!(
            "The people closest to you often see your {element} gifts more clearly than you do. \
             Ask a trusted friend where they see {temperament} in you, and notice how their \
             answer matches what your chart describes."
        ),
    ]
}

/// Drop every sentence that contains placeholder text, and any section left
/// empty by it. Returns the number of sentences removed.
pub fn strip_placeholders(content: &mut ReportContent) -> usize {
    let mut removed = 0;
    let (summary, n) = strip_sentences(&content.summary);
    content.summary = summary;
    removed += n;
    if find_placeholder(&content.title).is_some() {
        content.title.clear();
        removed += 1;
    }
    for section in &mut content.sections {
        let (body, n) = strip_sentences(&section.body);
        section.body = body;
        removed += n;
        if find_placeholder(&section.title).is_some() {
            section.title = section_title(&section.key);
        }
    }
    content.sections.retain(|s| !s.body.trim().is_empty());
    removed
}

fn strip_sentences(text: &str) -> (String, usize) {
    let mut kept = Vec::new();
    let mut removed = 0;
    for sentence in split_sentences(text) {
        if find_placeholder(sentence).is_some() {
            removed += 1;
        } else {
            kept.push(sentence.trim());
        }
    }
    (kept.join(" "), removed)
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => true,
            '.' | '!' | '?' => chars.peek().is_none_or(|(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            if !text[start..end].trim().is_empty() {
                sentences.push(&text[start..end]);
            }
            start = end;
        }
    }
    if !text[start..].trim().is_empty() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Add or fill every required section the content lacks.
pub fn insert_required_sections(
    content: &mut ReportContent,
    report_type: ReportType,
    input: &NormalizedInput,
) -> usize {
    let persona = Persona::new(input);
    let mut inserted = 0;
    for key in report_type.profile().required_sections {
        if content.has_section(key) {
            continue;
        }
        let body = section_body(key, &persona);
        match content.sections.iter_mut().find(|s| s.key == *key) {
            Some(section) => section.body = body,
            None => content.sections.push(ReportSection {
                key: key.to_string(),
                title: section_title(key),
                body,
            }),
        }
        inserted += 1;
    }
    inserted
}

/// Bring the section count up to the profile minimum, required sections
/// first, then general ones.
pub fn ensure_minimum_sections(
    content: &mut ReportContent,
    report_type: ReportType,
    input: &NormalizedInput,
) -> usize {
    let profile = report_type.profile();
    let persona = Persona::new(input);
    content.sections.retain(|s| !s.body.trim().is_empty());

    let candidates = profile
        .required_sections
        .iter()
        .chain(EXTRA_SECTIONS.iter())
        .copied();

    let mut added = 0;
    for key in candidates {
        if content.substantive_sections() >= profile.min_sections {
            break;
        }
        if content.has_section(key) {
            continue;
        }
        content.sections.push(ReportSection {
            key: key.to_string(),
            title: section_title(key),
            body: section_body(key, &persona),
        });
        added += 1;
    }
    added
}

/// Append personalised paragraphs, spread across sections, until the word
/// floor is reached or the paragraph pool runs out.
pub fn enrich_word_count(
    content: &mut ReportContent,
    report_type: ReportType,
    input: &NormalizedInput,
) -> usize {
    let min_words = report_type.profile().min_words;
    let persona = Persona::new(input);
    let mut appended = 0;

    for paragraph in enrichment_pool(&persona) {
        if content.word_count() >= min_words {
            break;
        }
        match content
            .sections
            .iter_mut()
            .min_by_key(|s| s.body.split_whitespace().count())
        {
            Some(section) => {
                section.body.push_str("\n\n");
                section.body.push_str(&paragraph);
            }
            None => {
                if !content.summary.is_empty() {
                    content.summary.push(' ');
                }
                content.summary.push_str(&paragraph);
            }
        }
        appended += 1;
    }
    appended
}

/// Run every local repair in order.
pub fn repair(content: &mut ReportContent, report_type: ReportType, input: &NormalizedInput) {
    if content.title.trim().is_empty() {
        content.title = format!("{} for {}", report_type.display_name(), input.name);
    }
    ensure_minimum_sections(content, report_type, input);
    insert_required_sections(content, report_type, input);
    enrich_word_count(content, report_type, input);
}

pub fn mark_low_quality(content: &mut ReportContent) {
    content.quality = Quality::Low;
    content.disclaimer = Some(LOW_QUALITY_DISCLAIMER.to_string());
}
