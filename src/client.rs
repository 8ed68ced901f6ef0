//! SyncClient — the process-wide manager owning all shared state.
//!
//! One `SyncClient` is created at startup with a transport and injected into
//! dependents by handle; there are no ambient singletons. Collection handles
//! expose the view-facing query and mutation surface for movies and reviews;
//! auth flows are the only other writers of shared state.

use std::sync::Arc;

use serde_json::json;

use crate::auth::{AuthGate, TokenStore};
use crate::cache::{CollectionCache, QueryKey};
use crate::error::RequestError;
use crate::mutation::{Intent, MutationEngine, MutationHandle};
use crate::notify::Noticeboard;
use crate::pipeline::RequestPipeline;
use crate::query::QueryHandle;
use crate::record::{Movie, NewMovie, NewReview, Record, Review};
use crate::transport::{Method, Transport};

/// Process-wide client state: credential, caches, notifications.
///
/// Defined init: empty caches, unauthenticated, no pending notification.
/// Clone-friendly; clones share everything.
#[derive(Clone)]
pub struct SyncClient {
    tokens: TokenStore,
    board: Noticeboard,
    pipeline: RequestPipeline,
    movies: CollectionHandle<Movie>,
    reviews: CollectionHandle<Review>,
}

impl SyncClient {
    /// Wire up a client over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let tokens = TokenStore::new();
        let board = Noticeboard::new();
        let pipeline = RequestPipeline::new(transport, tokens.clone());
        let movies = CollectionHandle::new(pipeline.clone(), board.clone());
        let reviews = CollectionHandle::new(pipeline.clone(), board.clone());
        Self {
            tokens,
            board,
            pipeline,
            movies,
            reviews,
        }
    }

    /// Client over HTTP, rooted at `base_url`. Requires the `http` feature.
    #[cfg(feature = "http")]
    pub fn over_http(base_url: impl Into<String>) -> Self {
        Self::new(Arc::new(crate::transport::HttpTransport::new(base_url)))
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn noticeboard(&self) -> &Noticeboard {
        &self.board
    }

    /// Gate for one protected view instance at `path`.
    pub fn guard(&self, path: impl Into<String>) -> AuthGate {
        AuthGate::new(self.tokens.clone(), path)
    }

    pub fn movies(&self) -> &CollectionHandle<Movie> {
        &self.movies
    }

    pub fn reviews(&self) -> &CollectionHandle<Review> {
        &self.reviews
    }

    /// Exchange credentials for a bearer token.
    ///
    /// Any rejection, including a success response without a token field,
    /// clears a stale credential and leaves the store unauthenticated.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), RequestError> {
        let body = json!({ "username": username, "password": password });
        match self
            .pipeline
            .call_raw(Method::Post, "/users/login", Some(body))
            .await
        {
            Ok(response) => match response.get("token").and_then(|t| t.as_str()) {
                Some(token) => {
                    self.tokens.set(token);
                    Ok(())
                }
                None => {
                    self.tokens.clear();
                    let message = response
                        .get("error")
                        .and_then(|e| e.as_str())
                        .unwrap_or("Invalid user")
                        .to_string();
                    Err(RequestError::Rejected {
                        status: 200,
                        message: Some(message),
                    })
                }
            },
            Err(e) => {
                self.tokens.clear();
                Err(e)
            }
        }
    }

    /// Create a user account. Does not touch the credential; the user logs
    /// in afterwards.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), RequestError> {
        let body = json!({ "username": username, "password": password });
        self.pipeline
            .call_raw(Method::Post, "/users", Some(body))
            .await?;
        Ok(())
    }

    /// Drop the credential, returning to the unauthenticated state.
    pub fn logout(&self) {
        self.tokens.clear();
    }
}

/// Query and mutation surface for one record type.
#[derive(Clone)]
pub struct CollectionHandle<T: Record> {
    pipeline: RequestPipeline,
    cache: CollectionCache<T>,
    engine: MutationEngine<T>,
}

impl<T: Record> CollectionHandle<T> {
    fn new(pipeline: RequestPipeline, board: Noticeboard) -> Self {
        let cache = CollectionCache::new();
        let engine = MutationEngine::new(pipeline.clone(), cache.clone(), board);
        Self {
            pipeline,
            cache,
            engine,
        }
    }

    /// The cache behind this collection's queries.
    pub fn cache(&self) -> &CollectionCache<T> {
        &self.cache
    }

    /// The engine behind this collection's mutations.
    /// [`MutationEngine::is_loading`] covers every mutation on the
    /// collection; per-form flags come from [`mutation`](Self::mutation).
    pub fn engine(&self) -> &MutationEngine<T> {
        &self.engine
    }

    /// A mutation handle with its own loading flag. One per view-side form:
    /// a delete in flight elsewhere leaves this handle's flag false.
    pub fn mutation(&self) -> MutationHandle<T> {
        self.engine.handle()
    }

    fn query_at(&self, key: QueryKey, path: String) -> QueryHandle<T> {
        QueryHandle::new(self.pipeline.clone(), self.cache.clone(), key, path)
    }
}

impl CollectionHandle<Movie> {
    /// The "all movies" query.
    pub fn all(&self) -> QueryHandle<Movie> {
        self.query_at(QueryKey::new("movies"), "/movies".to_string())
    }

    /// A single movie by id, cached under its own key.
    pub fn by_id(&self, id: &str) -> QueryHandle<Movie> {
        self.query_at(
            QueryKey::new(format!("movies/{}", id)),
            format!("/movies/{}", id),
        )
    }

    /// Intent to save a new movie, for dispatch through a
    /// [`MutationHandle`].
    pub fn create_intent(&self, input: NewMovie) -> Result<Intent<Movie>, RequestError> {
        let input = serde_json::to_value(&input)
            .map_err(|e| RequestError::Decode(e.to_string()))?;
        Ok(Intent::Create {
            key: QueryKey::new("movies"),
            input,
        })
    }

    /// Intent to update a movie, optimistic against the "all movies" cache.
    pub fn update_intent(&self, movie: Movie) -> Intent<Movie> {
        Intent::Update {
            key: QueryKey::new("movies"),
            item: movie,
        }
    }

    /// Intent to delete a movie by id, optimistic against the "all movies"
    /// cache.
    pub fn delete_intent(&self, id: &str) -> Intent<Movie> {
        Intent::Delete {
            key: QueryKey::new("movies"),
            id: id.to_string(),
        }
    }

    /// Save a new movie; the "all movies" cache gains the server entity on
    /// success.
    pub async fn create(&self, input: NewMovie) -> Result<Movie, RequestError> {
        self.engine.execute(self.create_intent(input)?).await
    }

    /// Update a movie, optimistically against the "all movies" cache.
    pub async fn update(&self, movie: Movie) -> Result<Movie, RequestError> {
        self.engine.execute(self.update_intent(movie)).await
    }

    /// Delete a movie by id, optimistically against the "all movies" cache.
    pub async fn delete(&self, id: &str) -> Result<Movie, RequestError> {
        self.engine.execute(self.delete_intent(id)).await
    }
}

impl CollectionHandle<Review> {
    /// The "all reviews" query.
    pub fn all(&self) -> QueryHandle<Review> {
        self.query_at(QueryKey::new("reviews"), "/reviews".to_string())
    }

    /// Reviews for one movie, cached per movie id.
    pub fn for_movie(&self, movie_id: &str) -> QueryHandle<Review> {
        self.query_at(
            QueryKey::new(format!("reviews/movie/{}", movie_id)),
            format!("/reviews/movie/{}", movie_id),
        )
    }

    /// Intent to save a new review, for dispatch through a
    /// [`MutationHandle`].
    pub fn create_intent(&self, input: NewReview) -> Result<Intent<Review>, RequestError> {
        let key = QueryKey::new(format!("reviews/movie/{}", input.movie));
        let input = serde_json::to_value(&input)
            .map_err(|e| RequestError::Decode(e.to_string()))?;
        Ok(Intent::Create { key, input })
    }

    /// Intent to update a review, optimistic against its parent movie's
    /// cache.
    pub fn update_intent(&self, review: Review) -> Intent<Review> {
        let key = QueryKey::new(format!("reviews/movie/{}", review.movie));
        Intent::Update { key, item: review }
    }

    /// Intent to delete a review. Takes the whole review because the cache
    /// key needs the parent movie id.
    pub fn delete_intent(&self, review: &Review) -> Intent<Review> {
        let key = QueryKey::new(format!("reviews/movie/{}", review.movie));
        Intent::Delete {
            key,
            id: review.id.clone(),
        }
    }

    /// Save a new review; the parent movie's review cache gains the server
    /// entity on success.
    pub async fn create(&self, input: NewReview) -> Result<Review, RequestError> {
        self.engine.execute(self.create_intent(input)?).await
    }

    /// Update a review, optimistically against its parent movie's cache.
    pub async fn update(&self, review: Review) -> Result<Review, RequestError> {
        self.engine.execute(self.update_intent(review)).await
    }

    /// Delete a review, optimistically against its parent movie's cache.
    pub async fn delete(&self, review: &Review) -> Result<Review, RequestError> {
        self.engine.execute(self.delete_intent(review)).await
    }
}
