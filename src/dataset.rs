use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ForecastError, Result};
use crate::fixture::{Fixture, Score};

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d/%m/%y"];

/// A row as it appears in the match export, before any validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFixture {
    #[serde(alias = "Team 1")]
    pub home: String,
    #[serde(alias = "Team 2")]
    pub away: String,
    #[serde(alias = "Result")]
    pub result: String,
    #[serde(alias = "Round")]
    pub round: u32,
    #[serde(alias = "Year")]
    pub year: i32,
    #[serde(alias = "New_Date", alias = "Date")]
    pub date: String,
}

impl RawFixture {
    pub fn parse(&self) -> Result<Fixture> {
        let score = self.result.parse::<Score>()?;
        let date = parse_day_first(&self.date)?;
        Ok(Fixture::new(
            self.home.trim(),
            self.away.trim(),
            score,
            self.round,
            self.year,
            date,
        ))
    }
}

pub fn parse_day_first(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    // Some exports append a time component.
    let s = s.split_whitespace().next().unwrap_or(s);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| ForecastError::Dataset(format!("unparseable match date `{raw}`")))
}

/// Validates every row up front so a bad result aborts before any model is trained.
pub fn parse_records(rows: &[RawFixture]) -> Result<Vec<Fixture>> {
    rows.iter().map(RawFixture::parse).collect()
}

pub fn read_fixtures<R: Read>(reader: R) -> Result<Vec<Fixture>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for record in csv_reader.deserialize::<RawFixture>() {
        rows.push(record?);
    }
    let fixtures = parse_records(&rows)?;
    debug!(rows = fixtures.len(), "parsed fixtures");
    Ok(fixtures)
}

pub fn load_fixtures(path: &Path) -> Result<Vec<Fixture>> {
    let file = std::fs::File::open(path).map_err(|err| {
        ForecastError::Dataset(format!("open {}: {err}", path.display()))
    })?;
    read_fixtures(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_original_column_names() {
        let raw = "Team 1,Team 2,Result,Round,Year,New_Date\n\
                   Flamengo,Santos,2 x 1,1,2019,27/04/2019\n\
                   Gremio,Bahia,0 x 0,1,2019,28/04/2019\n";
        let fixtures = read_fixtures(raw.as_bytes()).unwrap();
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].home, "Flamengo");
        assert_eq!(fixtures[0].score, Score::new(2, 1));
        assert_eq!(
            fixtures[1].date,
            NaiveDate::from_ymd_opt(2019, 4, 28).unwrap()
        );
    }

    #[test]
    fn malformed_result_is_reported() {
        let raw = "home,away,result,round,year,date\n\
                   A,B,2 - 1,1,2020,01/08/2020\n";
        let err = read_fixtures(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, ForecastError::MalformedResult(_)));
    }

    #[test]
    fn day_first_dates() {
        assert_eq!(
            parse_day_first("05/02/2021").unwrap(),
            NaiveDate::from_ymd_opt(2021, 2, 5).unwrap()
        );
        assert_eq!(
            parse_day_first("05/02/2021 16:00").unwrap(),
            NaiveDate::from_ymd_opt(2021, 2, 5).unwrap()
        );
        assert!(parse_day_first("2021-02-05").is_err());
    }
}
