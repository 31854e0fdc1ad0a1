use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shelf_authz::{require_session, Session, SessionGuard};
use shelf_http::error::AppError;

use super::models::{Book, BookInput};
use super::service::{CatalogService, Committed, UpdatedBook};

/// Set on mutation responses whose cache invalidation failed.
pub const CACHE_INVALIDATION_HEADER: HeaderName = HeaderName::from_static("x-cache-invalidation");

/// Reads are public; create, update and delete need a session.
pub fn router(service: CatalogService, guard: SessionGuard) -> Router {
    let protected = Router::new()
        .route("/", post(create_book))
        .route("/{id}", put(update_book).delete(delete_book))
        .route_layer(from_fn_with_state(guard, require_session));

    Router::new()
        .route("/", get(list_books))
        .route("/search", get(search_books))
        .route("/{id}", get(get_book))
        .merge(protected)
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub tag: String,
}

fn committed_headers<T>(committed: &Committed<T>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if !committed.is_clean() {
        headers.insert(CACHE_INVALIDATION_HEADER, HeaderValue::from_static("failed"));
    }
    headers
}

fn json_body(body: Result<Json<BookInput>, JsonRejection>) -> Result<BookInput, AppError> {
    body.map(|Json(input)| input)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

async fn list_books(State(service): State<CatalogService>) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(service.read_all().await?))
}

async fn search_books(
    State(service): State<CatalogService>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(service.search(&params.tag).await?))
}

async fn get_book(
    State(service): State<CatalogService>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    Ok(Json(service.read_one(&id).await?))
}

async fn create_book(
    State(service): State<CatalogService>,
    Extension(session): Extension<Session>,
    body: Result<Json<BookInput>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Json<Book>), AppError> {
    let committed = service.create(json_body(body)?).await?;
    tracing::info!(username = %session.username, book_id = %committed.value.id, "book added");
    let headers = committed_headers(&committed);
    Ok((StatusCode::CREATED, headers, Json(committed.value)))
}

async fn update_book(
    State(service): State<CatalogService>,
    Path(id): Path<String>,
    body: Result<Json<BookInput>, JsonRejection>,
) -> Result<(HeaderMap, Json<UpdatedBook>), AppError> {
    let committed = service.update(&id, json_body(body)?).await?;
    let headers = committed_headers(&committed);
    Ok((headers, Json(committed.value)))
}

async fn delete_book(
    State(service): State<CatalogService>,
    Path(id): Path<String>,
) -> Result<(HeaderMap, Json<Value>), AppError> {
    let committed = service.delete(&id).await?;
    let headers = committed_headers(&committed);
    Ok((headers, Json(json!({ "message": "Book has been deleted" }))))
}

/// OpenAPI fragment for the routes above; paths are relative to `/api/books`.
pub fn openapi() -> Value {
    let error = |description: &str| {
        json!({
            "description": description,
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                }
            }
        })
    };
    let book_list = json!({
        "description": "Books",
        "content": {
            "application/json": {
                "schema": { "type": "array", "items": { "$ref": "#/components/schemas/Book" } }
            }
        }
    });
    let book = |description: &str| {
        json!({
            "description": description,
            "content": {
                "application/json": { "schema": { "$ref": "#/components/schemas/Book" } }
            }
        })
    };
    let book_input = json!({
        "required": true,
        "content": {
            "application/json": { "schema": { "$ref": "#/components/schemas/BookInput" } }
        }
    });
    let id_param = json!([{
        "name": "id", "in": "path", "required": true, "schema": { "type": "string" }
    }]);
    let session = json!([{ "sessionCookie": [] }, { "bearerToken": [] }]);

    json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "responses": { "200": book_list.clone(), "500": error("Internal server error") }
                },
                "post": {
                    "summary": "Add a book",
                    "tags": ["Books"],
                    "security": session.clone(),
                    "requestBody": book_input.clone(),
                    "responses": {
                        "201": book("Created"),
                        "400": error("Invalid input"),
                        "403": error("Not authorized"),
                        "409": error("Title already exists")
                    }
                }
            },
            "/search": {
                "get": {
                    "summary": "Search books by tag",
                    "tags": ["Books"],
                    "parameters": [{
                        "name": "tag", "in": "query", "required": true, "schema": { "type": "string" }
                    }],
                    "responses": { "200": book_list, "400": error("Missing tag") }
                }
            },
            "/{id}": {
                "get": {
                    "summary": "Get a book",
                    "tags": ["Books"],
                    "parameters": id_param.clone(),
                    "responses": { "200": book("The book"), "404": error("Not found") }
                },
                "put": {
                    "summary": "Replace a book's fields",
                    "tags": ["Books"],
                    "security": session.clone(),
                    "parameters": id_param.clone(),
                    "requestBody": book_input,
                    "responses": {
                        "200": {
                            "description": "Updated fields",
                            "content": {
                                "application/json": { "schema": { "$ref": "#/components/schemas/UpdatedBook" } }
                            }
                        },
                        "400": error("Invalid input"),
                        "403": error("Not authorized"),
                        "404": error("Not found"),
                        "409": error("Title already exists")
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "security": session,
                    "parameters": id_param,
                    "responses": {
                        "200": { "description": "Book has been deleted" },
                        "403": error("Not authorized"),
                        "404": error("Not found")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "PublishedDate": {
                    "type": "object",
                    "properties": {
                        "month": { "type": "string", "example": "July" },
                        "year": { "type": "string", "example": "2009" }
                    },
                    "required": ["month", "year"]
                },
                "BookInput": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "minLength": 3, "example": "Moondust" },
                        "author": { "type": "string", "minLength": 3, "example": "Andrew Smith" },
                        "publisher": { "type": "string", "minLength": 3 },
                        "published_at": { "$ref": "#/components/schemas/PublishedDate" },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "image_path": { "type": "string" },
                        "review": { "type": "number", "minimum": 0, "maximum": 5 }
                    },
                    "required": ["title", "author", "publisher", "published_at"]
                },
                "UpdatedBook": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "publisher": { "type": "string" },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "review": { "type": "number" }
                    }
                },
                "Book": {
                    "allOf": [
                        { "$ref": "#/components/schemas/BookInput" },
                        {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string" },
                                "created_at": { "type": "string", "format": "date-time" }
                            },
                            "required": ["id", "created_at"]
                        }
                    ]
                }
            }
        }
    })
}
