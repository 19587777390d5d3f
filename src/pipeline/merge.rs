//! Fold per-page records into one document record.
//!
//! A lab form often spans two scanned pages: the header (customer, address,
//! dates) on the first, the rest of the parameter table on the second. Pages
//! arrive in page order and the earliest non-empty value always wins, so a
//! page that repeats a header field with a misread value cannot overwrite
//! what the first page said.

use crate::norms;
use crate::record::{WaterAnalysisRecord, WaterParameter};
use std::collections::HashSet;

/// Merge page records in page order.
///
/// - no records: the empty record
/// - one record: returned as is
/// - otherwise: scalars first-wins on trimmed non-empty values, parameters
///   deduplicated by `code` (by [`fallback_code`] of the name when the code is
///   empty) keeping the first occurrence, notes of every page joined with `\n`
pub fn merge(records: Vec<WaterAnalysisRecord>) -> WaterAnalysisRecord {
    let mut pages = records.into_iter();
    let Some(first) = pages.next() else {
        return WaterAnalysisRecord::default();
    };
    let rest: Vec<WaterAnalysisRecord> = pages.collect();
    if rest.is_empty() {
        return first;
    }

    let mut merged = WaterAnalysisRecord::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut notes: Vec<String> = Vec::new();

    for page in std::iter::once(first).chain(rest) {
        for (slot, value) in merged.scalar_fields_mut().into_iter().zip(page.scalar_fields()) {
            if slot.trim().is_empty() && !value.trim().is_empty() {
                *slot = value.to_string();
            }
        }

        for param in page.parameters {
            let fresh = dedup_key(&param).map_or(true, |key| seen.insert(key));
            if fresh {
                merged.parameters.push(param);
            }
        }

        if !page.notes.trim().is_empty() {
            notes.push(page.notes);
        }
    }

    merged.notes = notes.join("\n");
    merged
}

/// The code a parameter ends up with once fallback codes are assigned.
/// Parameters with neither a code nor a name have no key and are never
/// collapsed.
fn dedup_key(param: &WaterParameter) -> Option<String> {
    let code = param.code.trim();
    if !code.is_empty() {
        Some(code.to_string())
    } else if !param.name.trim().is_empty() {
        Some(fallback_code(&param.name))
    } else {
        None
    }
}

// ── Fallback codes ───────────────────────────────────────────────────────────

/// Give every parameter without a code one derived from its name.
///
/// A parameter whose code (given or derived) already appeared earlier in the
/// record is dropped, so every code in the result is unique apart from
/// parameters with neither a code nor a name.
pub fn assign_fallback_codes(mut record: WaterAnalysisRecord) -> WaterAnalysisRecord {
    let mut seen: HashSet<String> = HashSet::new();
    record.parameters.retain_mut(|param| {
        let key = dedup_key(param);
        if param.code.trim().is_empty() {
            param.code = fallback_code(&param.name);
        }
        key.map_or(true, |key| seen.insert(key))
    });
    record
}

/// Deterministic code for a parameter name.
///
/// Known display names map to their norm code ("Железо общее" → `iron`).
/// Anything else is transliterated into an ASCII slug ("Цвет воды" →
/// `tsvet_vody`). Names with nothing sluggable get `param_` and a hash.
pub fn fallback_code(name: &str) -> String {
    if let Some(code) = norms::code_for_display_name(name) {
        return code.to_string();
    }
    let slug = slugify(name);
    if slug.is_empty() {
        format!("param_{:08x}", fnv1a(name.trim()))
    } else {
        slug
    }
}

fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().to_lowercase().chars() {
        let piece = if c.is_ascii_alphanumeric() {
            Some(c.to_string())
        } else {
            transliterate(c).map(str::to_string)
        };
        match piece {
            Some(p) => {
                if pending_sep && !out.is_empty() {
                    out.push('_');
                }
                pending_sep = false;
                out.push_str(&p);
            }
            None => pending_sep = true,
        }
    }
    out
}

/// Lowercase Cyrillic → Latin. Hard and soft signs vanish.
fn transliterate(c: char) -> Option<&'static str> {
    let latin = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' | 'э' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' | 'ы' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' | 'ь' => "",
        'ю' => "yu",
        'я' => "ya",
        _ => return None,
    };
    Some(latin)
}

/// 32-bit FNV-1a.
fn fnv1a(s: &str) -> u32 {
    s.bytes().fold(0x811c_9dc5, |hash, b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}
