use chrono::{DateTime, NaiveDateTime, Utc};
use csv::StringRecord;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use harvest_core::models::{Identity, Record};

/// Column order of the row store.
pub const COLUMNS: [&str; 13] = [
    "timestamp",
    "asin",
    "title",
    "price",
    "original_price",
    "rating",
    "review_count",
    "image_url",
    "product_url",
    "best_seller",
    "delivery_info",
    "page_number",
    "scraped_successfully",
];

/// Columns a row store must carry for its rows to read back as records.
const REQUIRED: [&str; 3] = ["timestamp", "asin", "scraped_successfully"];

/// Whether a row store header can hold records, in any column order.
pub(crate) fn is_record_header(header: &StringRecord) -> bool {
    REQUIRED
        .iter()
        .all(|required| header.iter().any(|column| column.trim() == *required))
}

// -- Internal row type for csv (de)serialization --

/// One flat row of the row store. Field order must match [`COLUMNS`].
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RecordRow {
    #[serde(with = "timestamp")]
    timestamp: DateTime<Utc>,
    asin: String,
    title: Option<String>,
    price: Option<String>,
    original_price: Option<String>,
    rating: Option<f32>,
    review_count: Option<u32>,
    image_url: Option<String>,
    product_url: Option<String>,
    #[serde(with = "yes_no")]
    best_seller: Option<bool>,
    delivery_info: Option<String>,
    #[serde(default)]
    page_number: u32,
    #[serde(with = "yes_no")]
    scraped_successfully: Option<bool>,
}

impl RecordRow {
    /// Cells laid out under `header`, for row stores written with an older
    /// column layout. Columns the header lacks are left out; columns this
    /// row does not know are left blank.
    pub(crate) fn cells_for(&self, header: &StringRecord) -> Result<StringRecord, csv::Error> {
        let cells = self.cells()?;
        Ok(header
            .iter()
            .map(|name| {
                COLUMNS
                    .iter()
                    .position(|column| *column == name.trim())
                    .and_then(|i| cells.get(i))
                    .unwrap_or("")
            })
            .collect())
    }

    /// Cells in [`COLUMNS`] order.
    fn cells(&self) -> Result<StringRecord, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.serialize(self)?;
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes.as_slice())
            .records()
            .next()
            .unwrap_or_else(|| Ok(StringRecord::new()))
    }

    /// Rows not flagged as successful are not records.
    pub(crate) fn into_record(self) -> Option<Record> {
        if self.scraped_successfully != Some(true) {
            return None;
        }
        let identity = Identity::parse(&self.asin)?;
        Some(Record {
            identity,
            title: self.title,
            price: self.price,
            original_price: self.original_price,
            rating: self.rating,
            rating_count: self.review_count,
            image_url: self.image_url,
            product_url: self.product_url,
            best_seller: self.best_seller,
            delivery_info: self.delivery_info,
            page_number: self.page_number,
            captured_at: self.timestamp,
        })
    }
}

impl From<&Record> for RecordRow {
    fn from(record: &Record) -> Self {
        Self {
            timestamp: record.captured_at,
            asin: record.identity.to_string(),
            title: record.title.clone(),
            price: record.price.clone(),
            original_price: record.original_price.clone(),
            rating: record.rating,
            review_count: record.rating_count,
            image_url: record.image_url.clone(),
            product_url: record.product_url.clone(),
            best_seller: record.best_seller,
            delivery_info: record.delivery_info.clone(),
            page_number: record.page_number,
            scraped_successfully: Some(true),
        }
    }
}

/// `YES` / `NO` / empty cell.
mod yes_no {
    use super::*;
    use serde::de::Error;

    pub fn serialize<S: Serializer>(value: &Option<bool>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(true) => s.serialize_str("YES"),
            Some(false) => s.serialize_str("NO"),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) if v.eq_ignore_ascii_case("yes") => Ok(Some(true)),
            Some(v) if v.eq_ignore_ascii_case("no") => Ok(Some(false)),
            Some(other) => Err(D::Error::custom(format!("expected YES or NO, got '{other}'"))),
        }
    }
}

/// RFC 3339 on write; also accepts the older `YYYY-MM-DD HH:MM:SS` form
/// (taken as UTC) on read.
mod timestamp {
    use super::*;
    use serde::de::Error;

    const LEGACY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, LEGACY_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|_| D::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_rows(data: &str) -> Vec<Option<Record>> {
        csv::Reader::from_reader(data.as_bytes())
            .deserialize::<RecordRow>()
            .map(|row| row.unwrap().into_record())
            .collect()
    }

    #[test]
    fn writes_columns_in_fixed_order() {
        let mut record = Record::new(Identity::parse("B0C1").unwrap(), 2);
        record.title = Some("Laptop, 15\"".into());
        record.best_seller = Some(true);

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(RecordRow::from(&record)).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let mut lines = out.lines();

        assert_eq!(lines.next().unwrap(), COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.contains(",B0C1,\"Laptop, 15\"\"\",,,,,,,YES,,2,YES"), "{row}");
    }

    #[test]
    fn reads_legacy_rows() {
        let data = "timestamp,asin,title,price,original_price,rating,review_count,image_url,product_url,best_seller,delivery_info,scraped_successfully\n\
                    2025-01-04 10:22:31,B0LEGACY,Old Laptop,\"₹39,990\",,,,,,NO,,YES\n";
        let rows = parse_rows(data);
        let record = rows[0].clone().unwrap();

        assert_eq!(record.identity.as_str(), "B0LEGACY");
        assert_eq!(record.price.as_deref(), Some("₹39,990"));
        assert_eq!(record.best_seller, Some(false));
        assert_eq!(record.page_number, 0);
        assert_eq!(record.captured_at.to_rfc3339(), "2025-01-04T10:22:31+00:00");
    }

    #[test]
    fn cells_follow_an_older_header() {
        let mut record = Record::new(Identity::parse("B0C1").unwrap(), 4);
        record.title = Some("Laptop".into());
        let header = StringRecord::from(vec!["asin", "title", "scraped_successfully", "seller"]);

        let cells = RecordRow::from(&record).cells_for(&header).unwrap();

        assert_eq!(cells, StringRecord::from(vec!["B0C1", "Laptop", "YES", ""]));
    }

    #[test]
    fn record_header_needs_identity_and_flag() {
        assert!(is_record_header(&StringRecord::from(COLUMNS.to_vec())));
        assert!(!is_record_header(&StringRecord::from(vec!["id", "name"])));
        assert!(!is_record_header(&StringRecord::from(vec!["timestamp", "asin"])));
    }

    #[test]
    fn unsuccessful_rows_are_not_records() {
        let data = format!(
            "{}\n2025-01-04T10:22:31Z,B0X,,,,,,,,,,1,NO\n2025-01-04T10:22:31Z,,,,,,,,,,,1,YES\n",
            COLUMNS.join(",")
        );
        assert_eq!(parse_rows(&data), vec![None, None]);
    }

    #[test]
    fn rejects_bad_flag() {
        let data = format!(
            "{}\n2025-01-04T10:22:31Z,B0X,,,,,,,,maybe,,1,YES\n",
            COLUMNS.join(",")
        );
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        assert!(reader.deserialize::<RecordRow>().next().unwrap().is_err());
    }
}
