//! Raw row shapes, one per source file
//!
//! Field names are the canonical snake_case names; `rename_all` maps them
//! onto the camelCase source headers. Columns not listed here are ignored.

use serde::Deserialize;

use super::fields;

/// `title.basics`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleRow {
    pub tconst: String,
    #[serde(deserialize_with = "fields::text")]
    pub title_type: Option<String>,
    #[serde(deserialize_with = "fields::text")]
    pub primary_title: Option<String>,
    #[serde(deserialize_with = "fields::text")]
    pub original_title: Option<String>,
    #[serde(deserialize_with = "fields::flag")]
    pub is_adult: Option<bool>,
    #[serde(deserialize_with = "fields::int")]
    pub start_year: Option<i32>,
    #[serde(deserialize_with = "fields::int")]
    pub end_year: Option<i32>,
    #[serde(deserialize_with = "fields::int")]
    pub runtime_minutes: Option<i32>,
    #[serde(deserialize_with = "fields::text")]
    pub genres: Option<String>,
}

/// `name.basics`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRow {
    pub nconst: String,
    #[serde(deserialize_with = "fields::text")]
    pub primary_name: Option<String>,
    #[serde(deserialize_with = "fields::int")]
    pub birth_year: Option<i32>,
    #[serde(deserialize_with = "fields::int")]
    pub death_year: Option<i32>,
    #[serde(deserialize_with = "fields::text")]
    pub primary_profession: Option<String>,
    #[serde(deserialize_with = "fields::text")]
    pub known_for_titles: Option<String>,
}

/// `title.ratings`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRow {
    pub tconst: String,
    #[serde(deserialize_with = "fields::float")]
    pub average_rating: Option<f64>,
    #[serde(deserialize_with = "fields::int")]
    pub num_votes: Option<i64>,
}

/// `title.principals`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrincipalRow {
    pub tconst: String,
    #[serde(deserialize_with = "fields::int")]
    pub ordering: Option<i32>,
    pub nconst: String,
    #[serde(deserialize_with = "fields::text")]
    pub category: Option<String>,
    #[serde(deserialize_with = "fields::text")]
    pub job: Option<String>,
    #[serde(deserialize_with = "fields::text")]
    pub characters: Option<String>,
}
