//! services/api/src/web/books.rs
//!
//! Catalog management: books and categories.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;
use crate::web::{Ack, ErrorBody, ErrorResponse};
use circulation_core::domain::{Book, Category, NewBook, Principal};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct BookDto {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl From<Book> for BookDto {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            publisher: book.publisher,
            publication_year: book.publication_year,
            description: book.description,
            category_id: book.category_id,
            total_copies: book.total_copies,
            available_copies: book.available_copies,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub total_copies: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateBookRequest {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub total_copies: i32,
    pub available_copies: i32,
}

#[derive(Serialize, ToSchema)]
pub struct CategoryDto {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl From<Category> for CategoryDto {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
            description: category.description,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

fn require_staff(principal: &Principal) -> Result<(), ErrorResponse> {
    if principal.is_staff() {
        Ok(())
    } else {
        Err(ErrorResponse::forbidden("Forbidden: Staff access required"))
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List the whole catalog.
#[utoipa::path(
    get,
    path = "/books",
    responses(
        (status = 200, description = "All books", body = [BookDto]),
        (status = 401, description = "Unauthenticated", body = ErrorBody)
    )
)]
pub async fn list_books_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let books = state.store.list_books().await?;
    Ok(Json(
        books.into_iter().map(BookDto::from).collect::<Vec<_>>(),
    ))
}

/// Add a book to the catalog. New books start with every copy available.
#[utoipa::path(
    post,
    path = "/books",
    request_body = CreateBookRequest,
    responses(
        (status = 201, description = "Book created", body = BookDto),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 403, description = "Caller is not staff", body = ErrorBody)
    )
)]
pub async fn create_book_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateBookRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    require_staff(&principal)?;
    if req.title.trim().is_empty() || req.author.trim().is_empty() {
        return Err(ErrorResponse::bad_request("title and author are required"));
    }
    if req.total_copies < 0 {
        return Err(ErrorResponse::bad_request(
            "total copies cannot be negative",
        ));
    }

    let book = state
        .store
        .create_book(NewBook {
            title: req.title.trim().to_string(),
            author: req.author.trim().to_string(),
            isbn: req.isbn,
            publisher: req.publisher,
            publication_year: req.publication_year,
            description: req.description,
            category_id: req.category_id,
            total_copies: req.total_copies,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(BookDto::from(book))))
}

/// Update a catalog entry.
#[utoipa::path(
    put,
    path = "/books/{id}",
    request_body = UpdateBookRequest,
    params(("id" = Uuid, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book updated", body = BookDto),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 404, description = "No such book", body = ErrorBody)
    )
)]
pub async fn update_book_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBookRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    require_staff(&principal)?;
    if req.available_copies < 0 || req.available_copies > req.total_copies {
        return Err(ErrorResponse::bad_request(
            "available copies must be between 0 and total copies",
        ));
    }

    let existing = state.store.book(id).await?;
    let updated = state
        .store
        .update_book(Book {
            title: req.title,
            author: req.author,
            isbn: req.isbn,
            publisher: req.publisher,
            publication_year: req.publication_year,
            description: req.description,
            category_id: req.category_id,
            total_copies: req.total_copies,
            available_copies: req.available_copies,
            ..existing
        })
        .await?;
    Ok(Json(BookDto::from(updated)))
}

/// Remove a book from the catalog.
#[utoipa::path(
    delete,
    path = "/books/{id}",
    params(("id" = Uuid, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book deleted", body = Ack),
        (status = 404, description = "No such book", body = ErrorBody)
    )
)]
pub async fn delete_book_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    require_staff(&principal)?;
    state.store.delete_book(id).await?;
    Ok(Json(Ack::ok()))
}

/// List book categories.
#[utoipa::path(
    get,
    path = "/categories",
    responses((status = 200, description = "All categories", body = [CategoryDto]))
)]
pub async fn list_categories_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let categories = state.store.list_categories().await?;
    Ok(Json(
        categories
            .into_iter()
            .map(CategoryDto::from)
            .collect::<Vec<_>>(),
    ))
}

/// Create a category.
#[utoipa::path(
    post,
    path = "/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryDto),
        (status = 400, description = "Invalid payload", body = ErrorBody)
    )
)]
pub async fn create_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    require_staff(&principal)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ErrorResponse::bad_request("category name is required"));
    }
    let category = state
        .store
        .create_category(name, req.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(CategoryDto::from(category))))
}
