use actix_web::web::{Data, Path};
use actix_web::{get, HttpResponse};

use crate::error::{AppError, AppResult};
use crate::services::storage::{content_type_for_path, StorageService};

#[get("/storage/v1/object/public/{bucket}/{object_path:.*}")]
pub async fn public_object(storage: Data<StorageService>, path: Path<(String, String)>) -> AppResult<HttpResponse> {
    let (bucket, object_path) = path.into_inner();
    if bucket != storage.bucket() {
        return Err(AppError::NotFound("Bucket".to_string()));
    }

    if !StorageService::is_valid_object_path(&object_path) {
        return Err(AppError::Validation(format!("Invalid object path: {}", object_path)));
    }

    let bytes = storage
        .download(&object_path)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Object".to_string()))?;

    Ok(HttpResponse::Ok()
        .content_type(content_type_for_path(&object_path))
        .body(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};

    use crate::config::StorageConfig;

    #[actix_web::test]
    async fn test_unreadable_object_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageService::new(StorageConfig {
            root: dir.path().to_string_lossy().to_string(),
            bucket: "user-uploads".to_string(),
            public_url: "http://localhost:8080".to_string(),
        });
        tokio::fs::create_dir_all(dir.path().join("user-uploads/avatars/folder.png"))
            .await
            .unwrap();
        let app = test::init_service(App::new().app_data(Data::new(storage)).service(public_object)).await;

        let req = test::TestRequest::get()
            .uri("/storage/v1/object/public/user-uploads/avatars/folder.png")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let req = test::TestRequest::get()
            .uri("/storage/v1/object/public/user-uploads/avatars/missing.png")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/storage/v1/object/public/user-uploads/../secret")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
