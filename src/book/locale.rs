//! Locale lookup from a workbook subtitle.

use tracing::{debug, warn};

use crate::fuzz::ratio;

/// Locale of the untranslated guide.
pub const BASE_LOCALE: &str = "en-US";

/// Matches scoring below this are logged as low confidence.
const LOW_CONFIDENCE: u8 = 50;

/// Translated "Student Workbook" subtitles and their locale tags.
pub const SUBTITLE_LOCALES: &[(&str, &str)] = &[
    ("Teilnehmerarbeitsbuch", "de-DE"),
    ("Manuel d'exercices", "fr-FR"),
    ("受講生用のワークブック", "ja-JP"),
    ("受講生用ワークブック", "ja-JP"),
    ("수강생 워크북", "ko-KR"),
    ("Livro do aluno", "pt-BR"),
    ("Рабочая тетрадь", "ru-RU"),
    ("学员练习册", "zh-CN"),
    ("Libro de trabajo del estudiante", "es-ES"),
    ("छात्र-छात्रा की वर्कबुक", "hi-IN"),
    ("Student Workbook", "en-US"),
    ("Příručka pro studenty", "cs-CZ"),
];

/// Every locale tag a guide can be restored to.
pub fn known_locales() -> impl Iterator<Item = &'static str> {
    SUBTITLE_LOCALES.iter().map(|(_, locale)| *locale)
}

/// Locale whose subtitle is closest to `subtitle`.
///
/// There is no acceptance threshold: the best-scoring entry always wins, and
/// the first one on ties. Without a subtitle the base locale is returned.
pub fn locale_for_subtitle(subtitle: Option<&str>) -> &'static str {
    let Some(subtitle) = subtitle.map(str::trim).filter(|s| !s.is_empty()) else {
        return BASE_LOCALE;
    };

    let mut best: Option<(&str, &'static str, u8)> = None;
    for &(key, locale) in SUBTITLE_LOCALES {
        let score = ratio(subtitle, key);
        if best.is_none_or(|(_, _, top)| score > top) {
            best = Some((key, locale, score));
        }
    }
    let Some((key, locale, score)) = best else {
        return BASE_LOCALE;
    };

    if score < LOW_CONFIDENCE {
        warn!("subtitle {subtitle:?} is a weak match for {key:?} (score {score}), using {locale}");
    } else {
        debug!("subtitle {subtitle:?} matched {key:?} (score {score}): {locale}");
    }
    locale
}
