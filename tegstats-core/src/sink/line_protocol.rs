//! Точки InfluxDB поверх [`influxdb::WriteQuery`].
//!
//! Экранирование и форматирование line protocol делает `influxdb`; здесь
//! только правила отбора: пустые теги, отсутствующие и нечисловые значения
//! в точку не попадают.

use influxdb::{Query, Timestamp, Type, ValidQuery, WriteQuery};

/// Одна точка: измерение, теги, поля и метка времени в наносекундах.
#[derive(Debug, Clone)]
pub struct Point {
    query: WriteQuery,
    fields: usize,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp_ns: i64) -> Self {
        let ts = u128::try_from(timestamp_ns).unwrap_or_default();
        Self {
            query: WriteQuery::new(Timestamp::Nanoseconds(ts), measurement.into()),
            fields: 0,
        }
    }

    /// Пустые значения тегов InfluxDB не принимает, такие теги пропускаются.
    pub fn tag(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.query = self.query.add_tag(key, value);
        }
        self
    }

    pub fn tags<'a>(mut self, tags: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        for (key, value) in tags {
            self = self.tag(key, value);
        }
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Type>) -> Self {
        let value = value.into();
        if matches!(value, Type::Float(f) if !f.is_finite()) {
            return self;
        }
        self.query = self.query.add_field(key, value);
        self.fields += 1;
        self
    }

    /// Поле только при наличии значения.
    pub fn field_opt<V: Into<Type>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.field(key, v),
            None => self,
        }
    }

    /// Строка line protocol; `None`, если после фильтрации не осталось полей.
    pub fn to_line(&self) -> Result<Option<String>, influxdb::Error> {
        if self.fields == 0 {
            return Ok(None);
        }
        self.query.build().map(|q| Some(ValidQuery::get(q)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_field_kinds_and_skips_empty_tags() {
        let point = Point::new("energy_meters", 1_635_289_262_123_456_789)
            .tag("gateway_id", "1232100-00-E--TG0000000000A")
            .tag("site_name", "My Home")
            .tag("empty", "")
            .field("site_instant_power", 1234.5)
            .field("timeout", 1500i64)
            .field("running", true)
            .field("mode", "self_consumption");

        assert_eq!(
            point.to_line().unwrap().unwrap(),
            "energy_meters,gateway_id=1232100-00-E--TG0000000000A,site_name=My\\ Home \
             site_instant_power=1234.5,timeout=1500i,running=true,mode=\"self_consumption\" \
             1635289262123456789"
        );
    }

    #[test]
    fn escapes_string_fields_and_measurement() {
        let point = Point::new("my measure,x", 1).field("msg", r#"say "hi""#);
        assert_eq!(
            point.to_line().unwrap().unwrap(),
            r#"my\ measure\,x msg="say \"hi\"" 1"#
        );
    }

    #[test]
    fn point_without_usable_fields_is_skipped() {
        assert_eq!(Point::new("m", 1).to_line().unwrap(), None);
        assert_eq!(Point::new("m", 1).field("x", f64::NAN).to_line().unwrap(), None);
        assert_eq!(
            Point::new("m", 1)
                .field_opt::<f64>("x", None)
                .to_line()
                .unwrap(),
            None
        );
    }
}
