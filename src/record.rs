//! Domain records synchronized through the cache.
//!
//! Movies and reviews are independent collections; a review holds a
//! back-reference to its parent movie's id, not ownership. Identifiers are
//! assigned by the remote system on creation, which is why the `New*` input
//! types have no id field.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A record in a remote collection.
///
/// `COLLECTION` is the path segment of the collection's endpoints
/// (`/movies`, `/reviews`); `NOUN` is the human word used in notification
/// messages.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;
    const NOUN: &'static str;

    /// The server-assigned identifier.
    fn id(&self) -> &str;
}

/// Director details embedded in a movie. A value, not a collection of its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Director {
    pub name: String,
    #[serde(rename = "phoneNo")]
    pub phone_no: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub year: i32,
    pub director: Director,
}

/// Input for creating a movie; the server assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovie {
    pub title: String,
    pub year: i32,
    pub director: Director,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: String,
    /// Id of the movie this review belongs to.
    pub movie: String,
    /// The review text.
    pub review: String,
    pub rating: u8,
}

/// Input for creating a review; the server assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub movie: String,
    pub review: String,
    pub rating: u8,
}

impl Record for Movie {
    const COLLECTION: &'static str = "movies";
    const NOUN: &'static str = "movie";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Review {
    const COLLECTION: &'static str = "reviews";
    const NOUN: &'static str = "review";

    fn id(&self) -> &str {
        &self.id
    }
}
