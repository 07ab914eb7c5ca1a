//! Coin item in its wire, stored and domain forms.

use serde::{Deserialize, Serialize};

/// A playlist entry as consumed by readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coin {
    pub title: String,
    pub description: String,
    pub url: String,
    pub updated: String,
    pub thumbnail: String,
}

/// A playlist entry as persisted in the `coins` table.
///
/// Rows are keyed by an implicit surrogate id; nothing enforces uniqueness of `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCoin {
    pub title: String,
    pub description: String,
    pub url: String,
    pub updated: String,
    pub thumbnail: String,
}

impl DatabaseCoin {
    pub fn as_domain_model(&self) -> Coin {
        Coin {
            title: self.title.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            updated: self.updated.clone(),
            thumbnail: self.thumbnail.clone(),
        }
    }
}

/// Translate stored rows into the domain form, preserving order.
pub fn as_domain_models(rows: &[DatabaseCoin]) -> Vec<Coin> {
    rows.iter().map(DatabaseCoin::as_domain_model).collect()
}

/// Top-level wire envelope: `{"coins": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCoinContainer {
    pub coins: Vec<NetworkCoin>,
}

/// A playlist entry as sent by the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCoin {
    pub title: String,
    pub description: String,
    pub url: String,
    pub updated: String,
    pub thumbnail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_captions: Option<String>,
}

impl NetworkCoin {
    pub fn as_database_model(&self) -> DatabaseCoin {
        DatabaseCoin {
            title: self.title.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            updated: self.updated.clone(),
            thumbnail: self.thumbnail.clone(),
        }
    }

    pub fn as_domain_model(&self) -> Coin {
        Coin {
            title: self.title.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            updated: self.updated.clone(),
            thumbnail: self.thumbnail.clone(),
        }
    }
}

impl NetworkCoinContainer {
    /// Rows ready for `LocalStore::replace_all`, in wire order.
    pub fn as_database_model(&self) -> Vec<DatabaseCoin> {
        self.coins.iter().map(NetworkCoin::as_database_model).collect()
    }

    #[cfg(test)]
    pub fn as_domain_model(&self) -> Vec<Coin> {
        self.coins.iter().map(NetworkCoin::as_domain_model).collect()
    }
}
