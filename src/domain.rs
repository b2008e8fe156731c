use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CityscanError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Um,
    Lst,
    Uhi,
    Ndvi,
    Ndbi,
    Albedo,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 6] = [
        AnalysisType::Um,
        AnalysisType::Lst,
        AnalysisType::Uhi,
        AnalysisType::Ndvi,
        AnalysisType::Ndbi,
        AnalysisType::Albedo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Um => "um",
            AnalysisType::Lst => "lst",
            AnalysisType::Uhi => "uhi",
            AnalysisType::Ndvi => "ndvi",
            AnalysisType::Ndbi => "ndbi",
            AnalysisType::Albedo => "albedo",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = CityscanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AnalysisType::ALL
            .into_iter()
            .find(|analysis| analysis.as_str() == value.trim())
            .ok_or_else(|| CityscanError::UnknownAnalysisType(value.to_string()))
    }
}

/// An asset as reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub id: String,
    pub name: String,
}

impl RemoteAsset {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Semantic identity recovered from an asset name of the form
/// `<city>_<analysis>_<YYYY-MM-DD>[.ext]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedKey {
    pub city: String,
    pub analysis: AnalysisType,
    pub date: NaiveDate,
}

impl FromStr for ParsedKey {
    type Err = CityscanError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let parts = name.split('_').collect::<Vec<_>>();
        if parts.len() != 3 {
            return Err(CityscanError::malformed(
                name,
                format!("expected 3 '_'-separated fields, found {}", parts.len()),
            ));
        }

        let city = parts[0];
        if city.is_empty() {
            return Err(CityscanError::malformed(name, "empty city"));
        }
        // The city becomes a directory name under the cache root.
        if city.starts_with('.') || city.contains(['/', '\\', '\0']) {
            return Err(CityscanError::malformed(
                name,
                format!("city {city:?} is not a plain directory name"),
            ));
        }

        let analysis = parts[1]
            .parse::<AnalysisType>()
            .map_err(|_| CityscanError::malformed(name, format!("unknown analysis {:?}", parts[1])))?;

        let raw_date = parts[2].split('.').next().unwrap_or_default();
        let date = parse_iso_date(raw_date)
            .map_err(|_| CityscanError::malformed(name, format!("unparsable date {raw_date:?}")))?;

        Ok(Self {
            city: city.to_string(),
            analysis,
            date,
        })
    }
}

/// Sunday-anchored week containing a date. Ingestion keys cache entries by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekBucket {
    start: NaiveDate,
}

impl WeekBucket {
    pub fn containing(date: NaiveDate) -> Self {
        // Monday=0..Sunday=6, shifted so Sunday opens the bucket.
        let offset = (date.weekday().num_days_from_monday() + 1) % 7;
        Self {
            start: date - Duration::days(i64::from(offset)),
        }
    }

    pub fn from_iso(value: &str) -> Result<Self, CityscanError> {
        Ok(Self::containing(parse_iso_date(value)?))
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }
}

impl fmt::Display for WeekBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start.format(DATE_FORMAT))
    }
}

/// Identity of one cache entry directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub city: String,
    pub week_start: NaiveDate,
    pub analysis: AnalysisType,
}

impl CacheKey {
    pub fn new(city: impl Into<String>, week: WeekBucket, analysis: AnalysisType) -> Self {
        Self {
            city: city.into(),
            week_start: week.start(),
            analysis,
        }
    }

    pub fn week_dir_name(&self) -> String {
        self.week_start.format(DATE_FORMAT).to_string()
    }
}

impl From<&ParsedKey> for CacheKey {
    fn from(key: &ParsedKey) -> Self {
        CacheKey::new(key.city.clone(), WeekBucket::containing(key.date), key.analysis)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.city, self.week_dir_name(), self.analysis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Artifact {
    Image,
    Stats,
}

impl Artifact {
    pub const ALL: [Artifact; 2] = [Artifact::Image, Artifact::Stats];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Image => "image.tif",
            Artifact::Stats => "stats.json",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

pub fn parse_iso_date(value: &str) -> Result<NaiveDate, CityscanError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| CityscanError::InvalidDate(value.to_string()))
}
