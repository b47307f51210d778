//! Typed calls for the Librarian resources, built on `ApiClient::send`.

use serde_json::Value;
use tracing::{info, warn};

use crate::models::{
    AuthPayload, BookCopy, BorrowRequest, Borrowing, Library, LoginRequest, NewTitle,
    RegisterRequest, Title, TitleUpdate, User,
};

use super::client::{ApiClient, RequestOptions};
use super::envelope::ApiResponse;
use super::events::SessionEvent;
use super::ApiError;

/// Page, page size and free-text search for list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

impl ListQuery {
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn to_options(&self) -> RequestOptions {
        let mut options = RequestOptions::new();
        if let Some(page) = self.page {
            options = options.query("page", page);
        }
        if let Some(limit) = self.limit {
            options = options.query("limit", limit);
        }
        if let Some(ref search) = self.search {
            if !search.trim().is_empty() {
                options = options.query("search", search.trim());
            }
        }
        options
    }
}

/// Percent-encode one path segment (RFC 3986 unreserved characters pass).
fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

impl ApiClient {
    // ===== Authentication =====

    /// Log in; a successful envelope's token becomes the session token.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ApiResponse<AuthPayload>, ApiError> {
        let route = self.config().routes.login.clone();
        let response = self
            .post::<AuthPayload, _>(&route, &LoginRequest { email, password })
            .await?;
        self.adopt_token(&response);
        Ok(response)
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<ApiResponse<AuthPayload>, ApiError> {
        let route = self.config().routes.register.clone();
        let body = RegisterRequest {
            name,
            email,
            password,
        };
        let response = self.post::<AuthPayload, _>(&route, &body).await?;
        self.adopt_token(&response);
        Ok(response)
    }

    /// Tell the backend, then forget the local token whatever it said.
    pub async fn logout(&self) -> Result<ApiResponse<Value>, ApiError> {
        let route = self.config().routes.logout.clone();
        let result = self.post(&route, &serde_json::json!({})).await;

        if let Err(e) = self.session().clear() {
            warn!(error = %format!("{:#}", e), "Failed to clear stored session");
        }
        info!("Logged out");
        self.emit(SessionEvent::LoggedOut);
        result
    }

    pub async fn current_user(&self) -> Result<ApiResponse<User>, ApiError> {
        let route = self.config().routes.me.clone();
        self.get(&route).await
    }

    fn adopt_token(&self, response: &ApiResponse<AuthPayload>) {
        if !response.is_success() {
            return;
        }
        let Some(payload) = response.data().filter(|p| !p.access_token.is_empty()) else {
            warn!("Successful auth response carried no token");
            return;
        };
        if let Err(e) = self.session().replace(&payload.access_token) {
            warn!(error = %format!("{:#}", e), "Failed to persist session token");
        }
        info!("Logged in");
        self.emit(SessionEvent::LoggedIn);
    }

    // ===== Titles =====

    pub async fn list_titles(&self, query: &ListQuery) -> Result<ApiResponse<Vec<Title>>, ApiError> {
        self.get_with("/titles", query.to_options()).await
    }

    pub async fn get_title(&self, id: &str) -> Result<ApiResponse<Title>, ApiError> {
        self.get(&format!("/titles/{}", encode_segment(id))).await
    }

    pub async fn create_title(&self, title: &NewTitle) -> Result<ApiResponse<Title>, ApiError> {
        self.post("/titles", title).await
    }

    pub async fn update_title(
        &self,
        id: &str,
        update: &TitleUpdate,
    ) -> Result<ApiResponse<Title>, ApiError> {
        self.put(&format!("/titles/{}", encode_segment(id)), update)
            .await
    }

    pub async fn delete_title(&self, id: &str) -> Result<ApiResponse<Value>, ApiError> {
        self.delete(&format!("/titles/{}", encode_segment(id))).await
    }

    // ===== Copies =====

    pub async fn list_copies(&self, title_id: &str) -> Result<ApiResponse<Vec<BookCopy>>, ApiError> {
        self.get(&format!("/titles/{}/copies", encode_segment(title_id)))
            .await
    }

    // ===== Libraries =====

    pub async fn list_libraries(
        &self,
        query: &ListQuery,
    ) -> Result<ApiResponse<Vec<Library>>, ApiError> {
        self.get_with("/libraries", query.to_options()).await
    }

    pub async fn get_library(&self, id: &str) -> Result<ApiResponse<Library>, ApiError> {
        self.get(&format!("/libraries/{}", encode_segment(id))).await
    }

    // ===== Borrowing =====

    pub async fn borrow_copy(&self, copy_id: &str) -> Result<ApiResponse<Borrowing>, ApiError> {
        self.post("/borrowings", &BorrowRequest { copy_id }).await
    }

    pub async fn return_borrowing(&self, id: &str) -> Result<ApiResponse<Borrowing>, ApiError> {
        self.post(
            &format!("/borrowings/{}/return", encode_segment(id)),
            &serde_json::json!({}),
        )
        .await
    }

    pub async fn my_borrowings(
        &self,
        query: &ListQuery,
    ) -> Result<ApiResponse<Vec<Borrowing>>, ApiError> {
        self.get_with("/borrowings/me", query.to_options()).await
    }
}
