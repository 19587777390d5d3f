//! Drinking-water norms (SanPiN 1.2.3685-21) keyed by parameter code.
//!
//! Pure reference data: the table is built once and never written. The
//! recovery pipeline reads it to derive fallback codes from printed parameter
//! names, and [`evaluate`] compares a finished record against it.

use crate::record::WaterAnalysisRecord;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// Regulatory range for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormReference {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub unit: &'static str,
    pub display_name: &'static str,
}

const fn upper(max: f64, unit: &'static str, display_name: &'static str) -> NormReference {
    NormReference {
        min: None,
        max: Some(max),
        unit,
        display_name,
    }
}

/// The norm table, in the order the regulation lists them.
pub const NORM_TABLE: &[(&str, NormReference)] = &[
    (
        "ph",
        NormReference {
            min: Some(6.0),
            max: Some(9.0),
            unit: "pH",
            display_name: "Водородный показатель (pH)",
        },
    ),
    ("hardness", upper(7.0, "мг-экв/л", "Жёсткость общая")),
    ("iron", upper(0.3, "мг/л", "Железо общее")),
    ("manganese", upper(0.1, "мг/л", "Марганец")),
    ("turbidity", upper(2.6, "НТУ", "Мутность")),
    ("color", upper(20.0, "градусы", "Цветность")),
    ("odor", upper(2.0, "баллы", "Запах")),
    ("chlorides", upper(350.0, "мг/л", "Хлориды")),
    ("sulfates", upper(500.0, "мг/л", "Сульфаты")),
    ("nitrates", upper(45.0, "мг/л", "Нитраты")),
    ("nitrites", upper(3.0, "мг/л", "Нитриты")),
    ("ammonia", upper(2.0, "мг/л", "Аммиак (аммоний)")),
    ("tds", upper(1000.0, "мг/л", "Сухой остаток (TDS)")),
    ("oxidizability", upper(5.0, "мг O₂/л", "Окисляемость перманганатная")),
    ("fluoride", upper(1.5, "мг/л", "Фториды")),
    ("conductivity", upper(2000.0, "мкСм/см", "Электропроводность")),
    ("alkalinity", upper(6.5, "мг-экв/л", "Щёлочность")),
    ("sulphide", upper(0.003, "мг/л", "Сероводород")),
];

static BY_CODE: Lazy<HashMap<&'static str, &'static NormReference>> =
    Lazy::new(|| NORM_TABLE.iter().map(|(code, norm)| (*code, norm)).collect());

/// Every accepted spelling of a display name → code. A name like
/// "Сухой остаток (TDS)" is reachable as the full name, as "сухой остаток",
/// and as "tds".
static BY_NAME: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (code, norm) in NORM_TABLE {
        let full = fold_name(norm.display_name);
        if let Some((head, rest)) = full.split_once('(') {
            map.insert(head.trim().to_string(), *code);
            map.insert(rest.trim_end_matches(')').trim().to_string(), *code);
        }
        map.insert(full, *code);
    }
    map
});

/// Look up the norm for a parameter code, case-insensitively.
pub fn get_norm(code: &str) -> Option<&'static NormReference> {
    BY_CODE.get(code.trim().to_lowercase().as_str()).copied()
}

/// `true` when `value` lies outside the norm for `code`. Unknown codes never exceed.
pub fn exceeds_norm(code: &str, value: f64) -> bool {
    matches!(
        status_for(get_norm(code), value),
        NormStatus::BelowMin | NormStatus::AboveMax
    )
}

/// Map a printed parameter name to its code when it matches a known display name.
pub fn code_for_display_name(name: &str) -> Option<&'static str> {
    BY_NAME.get(&fold_name(name)).copied()
}

/// Lowercase, trim, and treat `ё` as `е`: forms print both.
fn fold_name(name: &str) -> String {
    name.trim().to_lowercase().replace('ё', "е")
}

/// Outcome of comparing one parameter with its norm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormStatus {
    WithinNorm,
    BelowMin,
    AboveMax,
    NoNorm,
}

/// One row of a norm evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormFinding {
    pub code: String,
    pub name: String,
    pub value: f64,
    pub status: NormStatus,
    pub norm: Option<NormReference>,
}

/// Compare every parameter of `record` with the norm table, in record order.
pub fn evaluate(record: &WaterAnalysisRecord) -> Vec<NormFinding> {
    record
        .parameters
        .iter()
        .map(|p| {
            let norm = get_norm(&p.code);
            NormFinding {
                code: p.code.clone(),
                name: p.name.clone(),
                value: p.value,
                status: status_for(norm, p.value),
                norm: norm.copied(),
            }
        })
        .collect()
}

fn status_for(norm: Option<&NormReference>, value: f64) -> NormStatus {
    let Some(norm) = norm else {
        return NormStatus::NoNorm;
    };
    if norm.min.is_some_and(|min| value < min) {
        NormStatus::BelowMin
    } else if norm.max.is_some_and(|max| value > max) {
        NormStatus::AboveMax
    } else {
        NormStatus::WithinNorm
    }
}
