//! Разбор текстовых форматов времени и вложенного JSON, которые отдаёт шлюз.
//!
//! Шлюз использует сразу несколько кодировок:
//! - RFC 3339 с наносекундами и смещением (`2021-10-26T16:01:02.123456789-07:00`) -
//!   большинство временных меток устройств и диагностик;
//! - то же с микросекундами - только `LastRxTime` в блоках `pvac_alerts`/`pvs_alerts`;
//! - старый формат через пробел с явным смещением (`2021-10-19 09:12:50 +0800`) -
//!   время запуска шлюза;
//! - длительность в стиле `89h51m33.77086138s` - аптайм шлюза;
//! - JSON, закодированный строкой внутри JSON - поле `decoded_alert` в `grid_faults`.
//!
//! Все функции чистые: либо возвращают значение, либо явную ошибку.

use crate::error::{DurationParseError, TimeParseError};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::Deserialize;
use std::time::Duration;

const MICROS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";
const LEGACY_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Разобрать метку времени в формате RFC 3339 с наносекундами.
pub fn parse_nanos(input: &str) -> Result<DateTime<FixedOffset>, TimeParseError> {
    DateTime::parse_from_rfc3339(input.trim()).map_err(|e| TimeParseError {
        format: "nanosecond",
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Закодировать метку обратно в формат с наносекундами.
///
/// Дробная часть выводится минимальной группой из 3/6/9 цифр.
pub fn format_nanos(instant: &DateTime<FixedOffset>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Разобрать метку времени с микросекундами (`LastRxTime`).
pub fn parse_micros(input: &str) -> Result<DateTime<FixedOffset>, TimeParseError> {
    DateTime::parse_from_str(input.trim(), MICROS_FORMAT).map_err(|e| TimeParseError {
        format: "microsecond",
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Закодировать метку в формат с ровно шестью знаками после запятой.
pub fn format_micros(instant: &DateTime<FixedOffset>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Разобрать старый формат через пробел (`start_time` в `/api/status`).
pub fn parse_legacy(input: &str) -> Result<DateTime<FixedOffset>, TimeParseError> {
    DateTime::parse_from_str(input.trim(), LEGACY_FORMAT).map_err(|e| TimeParseError {
        format: "legacy",
        input: input.to_string(),
        reason: e.to_string(),
    })
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{00b5}s" | "\u{03bc}s" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(60 * 60 * 1_000_000_000),
        _ => None,
    }
}

/// Разобрать длительность вида `89h51m33.77086138s`.
///
/// Грамматика: необязательный знак `+`, затем одна или больше пар
/// «число с необязательной дробной частью + единица». Единицы: `ns`, `us`
/// (`µs`), `ms`, `s`, `m`, `h`. Одиночный `0` допускается без единицы.
/// Дробная часть считается в целых наносекундах, без плавающей точки.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let original = input;
    let mut rest = input.trim();

    if let Some(stripped) = rest.strip_prefix('-') {
        if stripped.trim_start_matches(['0', '.']).is_empty() {
            return Ok(Duration::ZERO);
        }
        return Err(DurationParseError::Negative(original.to_string()));
    }
    rest = rest.strip_prefix('+').unwrap_or(rest);

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(DurationParseError::Invalid(original.to_string()));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after_int) = rest.split_at(int_len);

        let (frac_part, after_frac) = match after_int.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after_int),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationParseError::Invalid(original.to_string()));
        }

        let unit_len = after_frac
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(after_frac.len());
        if unit_len == 0 {
            return Err(DurationParseError::MissingUnit(original.to_string()));
        }
        let (unit, tail) = after_frac.split_at(unit_len);
        let scale = unit_nanos(unit).ok_or_else(|| DurationParseError::UnknownUnit {
            unit: unit.to_string(),
            input: original.to_string(),
        })?;

        let overflow = || DurationParseError::Overflow(original.to_string());

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

        if !frac_part.is_empty() {
            // Больше 18 знаков не влияют на наносекунды ни для одной единицы.
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().map_err(|_| overflow())?;
            let denom = 10u128.pow(digits.len() as u32);
            nanos = nanos.checked_add(frac * scale / denom).ok_or_else(overflow)?;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
        rest = tail;
    }

    let secs = u64::try_from(total / 1_000_000_000)
        .map_err(|_| DurationParseError::Overflow(original.to_string()))?;
    Ok(Duration::new(secs, (total % 1_000_000_000) as u32))
}

/// Значение внутри `decoded_alert`: шлюз присылает то строку, то число.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AlertValue {
    Number(f64),
    Text(String),
}

impl AlertValue {
    /// Текстовое представление для хранилища: числа с шестью знаками.
    pub fn render(&self) -> String {
        match self {
            AlertValue::Number(n) => format!("{n:.6}"),
            AlertValue::Text(s) => s.clone(),
        }
    }
}

/// Одна тройка из распакованного `decoded_alert`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecodedAlert {
    pub name: String,
    pub value: AlertValue,
    #[serde(default, alias = "unit")]
    pub units: String,
}

/// Распаковать строку `decoded_alert` вторым проходом JSON-парсера.
///
/// Пустая строка означает отсутствие расшифровки и даёт пустой список.
pub fn unwrap_decoded_alert(raw: &str) -> Result<Vec<DecodedAlert>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}

/// Адаптеры для `#[serde(deserialize_with = ...)]`.
///
/// Пустая строка и отсутствующее поле дают `None`; непустая строка,
/// которую не удалось разобрать, проваливает десериализацию всей записи.
pub mod de {
    use super::*;
    use serde::de::Error as _;
    use serde::Deserializer;

    fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.filter(|s| !s.trim().is_empty()))
    }

    pub fn nanos<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        text(deserializer)?
            .map(|s| parse_nanos(&s).map_err(D::Error::custom))
            .transpose()
    }

    pub fn micros<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        text(deserializer)?
            .map(|s| parse_micros(&s).map_err(D::Error::custom))
            .transpose()
    }

    pub fn legacy<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        text(deserializer)?
            .map(|s| parse_legacy(&s).map_err(D::Error::custom))
            .transpose()
    }

    pub fn duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        text(deserializer)?
            .map(|s| parse_duration(&s).map_err(D::Error::custom))
            .transpose()
    }
}
