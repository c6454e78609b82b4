use serde::{Deserialize, Deserializer, Serialize};
use serde_aux::field_attributes::deserialize_bool_from_anything;

#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub nickname: Option<String>,
}

/// Resource class a push or pull operates on. Each class carries its own
/// sync timestamp on the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    History,
    Favourites,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::History => write!(f, "history"),
            ResourceKind::Favourites => write!(f, "favourites"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Manga {
    #[serde(alias = "id")]
    pub manga_id: i64,
    pub title: String,
    pub alt_title: Option<String>,
    pub url: String,
    pub public_url: String,
    pub rating: f64,
    #[serde(default, deserialize_with = "deserialize_option_bool_from_anything")]
    pub nsfw: Option<bool>,
    pub content_rating: Option<String>,
    pub cover_url: String,
    pub large_cover_url: Option<String>,
    pub state: Option<String>,
    pub author: Option<String>,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Manga {
    /// Stand-in row for a manga referenced by id only.
    pub fn placeholder(manga_id: i64) -> Self {
        Manga {
            manga_id,
            title: String::new(),
            alt_title: Some(String::new()),
            url: String::new(),
            public_url: String::new(),
            rating: -1.0,
            nsfw: Some(false),
            content_rating: Some(String::new()),
            cover_url: String::new(),
            large_cover_url: Some(String::new()),
            state: Some(String::new()),
            author: Some(String::new()),
            source: String::new(),
            tags: vec![],
        }
    }

    /// Explicit flag first, otherwise derived from the content rating.
    pub fn is_nsfw(&self) -> Option<bool> {
        self.nsfw.or_else(|| {
            self.content_rating
                .as_deref()
                .filter(|rating| !rating.is_empty())
                .map(|rating| rating.eq_ignore_ascii_case("ADULT"))
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    #[serde(alias = "id")]
    pub tag_id: i64,
    pub title: String,
    pub key: String,
    pub source: String,
    #[serde(default, deserialize_with = "deserialize_option_bool_from_anything")]
    pub pinned: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Category {
    #[serde(alias = "id")]
    pub category_id: i64,
    pub created_at: i64,
    pub sort_key: i32,
    pub title: String,
    pub order: String,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub track: bool,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub show_in_lib: bool,
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl Category {
    pub const PLACEHOLDER_TITLE: &'static str = "Unknown";
    pub const DEFAULT_ORDER: &'static str = "NEWEST";

    /// Stand-in row for a category referenced by a favourite only. Its zero
    /// creation time loses to any real category pushed later.
    pub fn placeholder(category_id: i64) -> Self {
        Category {
            category_id,
            created_at: 0,
            sort_key: 0,
            title: Self::PLACEHOLDER_TITLE.to_string(),
            order: Self::DEFAULT_ORDER.to_string(),
            track: true,
            show_in_lib: true,
            deleted_at: Some(0),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Favourite {
    pub manga_id: i64,
    #[serde(default)]
    pub manga: Option<Manga>,
    pub category_id: i64,
    pub sort_key: i32,
    #[serde(default, deserialize_with = "deserialize_bool_from_anything")]
    pub pinned: bool,
    pub created_at: i64,
    #[serde(default)]
    pub deleted_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct History {
    pub manga_id: i64,
    #[serde(default)]
    pub manga: Option<Manga>,
    pub created_at: i64,
    pub updated_at: i64,
    pub chapter_id: i64,
    pub page: i32,
    pub scroll: f64,
    pub percent: f64,
    #[serde(default)]
    pub chapters: i32,
    #[serde(default)]
    pub deleted_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FavouritesPackage {
    #[serde(rename = "favourite_categories", alias = "categories", default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub favourites: Vec<Favourite>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HistoryPackage {
    #[serde(default)]
    pub history: Vec<History>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

fn deserialize_option_bool_from_anything<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Flag(#[serde(deserialize_with = "deserialize_bool_from_anything")] bool);

    Ok(Option::<Flag>::deserialize(deserializer)?.map(|Flag(value)| value))
}
