//! Library client methods: books, folders, bookmarks, ratings and progress

use serde::{Deserialize, Serialize};
use shelf_core::{Book, BookFormat, BookQuery, Bookmark, Folder, Page, Rating, ReadingProgress};

use tracing::warn;

use super::{ApiRequest, ClientError, ShelfClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonateBookRequest {
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub format: BookFormat,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Location of the already uploaded file
    pub file_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    /// 1 to 5 stars
    pub value: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub percentage: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Serialize)]
struct CreateFolderRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BookRef<'a> {
    book_id: &'a str,
}

impl ShelfClient {
    /// List one page of the catalogue
    pub async fn list_books(&self, query: &BookQuery) -> Result<Page<Book>, ClientError> {
        let request = ApiRequest::get("/books").query_params(query)?;
        let page: Page<Book> = self.execute(request).await?;
        self.cache().insert_many(page.items.iter().cloned());
        Ok(page)
    }

    pub async fn get_book(&self, id: &str) -> Result<Book, ClientError> {
        let book: Book = self.execute(ApiRequest::get(format!("/books/{id}"))).await?;
        self.cache().insert(book.clone());
        Ok(book)
    }

    /// Download the book file (PDF or EPUB bytes)
    pub async fn download_book(&self, id: &str) -> Result<Vec<u8>, ClientError> {
        self.execute_bytes(ApiRequest::get(format!("/books/{id}/file")))
            .await
    }

    pub async fn donate_book(&self, donation: &DonateBookRequest) -> Result<Book, ClientError> {
        let request = ApiRequest::post("/books").json(donation)?;
        let book: Book = self.execute(request).await?;
        self.cache().insert(book.clone());
        Ok(book)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Book>, ClientError> {
        let request = ApiRequest::get("/search").query_pair("q", query);
        self.execute(request).await
    }

    pub async fn list_folders(&self) -> Result<Vec<Folder>, ClientError> {
        self.execute(ApiRequest::get("/folders")).await
    }

    pub async fn create_folder(&self, name: &str) -> Result<Folder, ClientError> {
        let request = ApiRequest::post("/folders").json(&CreateFolderRequest { name })?;
        self.execute(request).await
    }

    pub async fn add_to_folder(&self, folder_id: &str, book_id: &str) -> Result<Folder, ClientError> {
        let request =
            ApiRequest::post(format!("/folders/{folder_id}/books")).json(&BookRef { book_id })?;
        self.execute(request).await
    }

    pub async fn remove_from_folder(&self, folder_id: &str, book_id: &str) -> Result<(), ClientError> {
        self.execute_empty(ApiRequest::delete(format!(
            "/folders/{folder_id}/books/{book_id}"
        )))
        .await
    }

    pub async fn bookmarks(&self) -> Result<Vec<Bookmark>, ClientError> {
        self.execute(ApiRequest::get("/bookmarks")).await
    }

    pub async fn add_bookmark(&self, book_id: &str) -> Result<Bookmark, ClientError> {
        let request = ApiRequest::post("/bookmarks").json(&BookRef { book_id })?;
        self.execute(request).await
    }

    pub async fn remove_bookmark(&self, book_id: &str) -> Result<(), ClientError> {
        self.execute_empty(ApiRequest::delete(format!("/bookmarks/{book_id}")))
            .await
    }

    pub async fn rate_book(&self, book_id: &str, rating: &RatingRequest) -> Result<Rating, ClientError> {
        if !(1..=5).contains(&rating.value) {
            return Err(ClientError::BadRequest(format!(
                "rating must be between 1 and 5, got {}",
                rating.value
            )));
        }
        let request = ApiRequest::post(format!("/ratings/{book_id}")).json(rating)?;
        self.execute(request).await
    }

    pub async fn book_ratings(&self, book_id: &str) -> Result<Vec<Rating>, ClientError> {
        self.execute(ApiRequest::get(format!("/ratings/{book_id}")))
            .await
    }

    pub async fn update_progress(
        &self,
        book_id: &str,
        progress: &ProgressRequest,
    ) -> Result<ReadingProgress, ClientError> {
        let request = ApiRequest::put(format!("/books/{book_id}/progress")).json(progress)?;
        self.execute(request).await
    }

    /// Rate a book, showing the rating in the cache before the server confirms
    ///
    /// The cached record is restored if the request fails, and replaced by
    /// the server's copy once the rating is accepted.
    pub async fn rate_book_optimistic(
        &self,
        book_id: &str,
        rating: &RatingRequest,
    ) -> Result<Rating, ClientError> {
        let value = rating.value;
        let guard = self.cache().patch_optimistic(book_id, |book| {
            if book.user_rating.is_none() {
                book.ratings_count += 1;
            }
            book.user_rating = Some(value);
        });

        let confirmed = self.rate_book(book_id, rating).await?;
        if let Some(guard) = guard {
            // aggregates only the server knows; fall back to the local guess
            match self.execute::<Book>(ApiRequest::get(format!("/books/{book_id}"))).await {
                Ok(book) => guard.commit_with(book),
                Err(err) => {
                    warn!(book_id, error = %err, "could not reload rated book; keeping local rating");
                    guard.commit();
                }
            }
        }
        Ok(confirmed)
    }

    /// Record reading progress, updating the cache before the server confirms
    pub async fn update_progress_optimistic(
        &self,
        book_id: &str,
        progress: &ProgressRequest,
    ) -> Result<ReadingProgress, ClientError> {
        let percentage = progress.percentage;
        let guard = self
            .cache()
            .patch_optimistic(book_id, |book| book.progress = Some(percentage));

        let confirmed = self.update_progress(book_id, progress).await?;
        if let Some(guard) = guard {
            guard.commit();
        }
        Ok(confirmed)
    }
}
