use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Log every HTTP request with its status and duration.
///
/// Public token routes carry the secret in the path; it is masked before
/// logging.
pub async fn request_logger(req: Request<Body>, next: Next) -> Response {
    let start = std::time::Instant::now();
    let method = req.method().clone();
    let path = mask_public_token(req.uri().path());

    let response = next.run(req).await;
    let status = response.status().as_u16();
    let elapsed_ms = start.elapsed().as_millis();

    if response.status().is_server_error() {
        tracing::error!("{} {} -> {} ({} ms)", method, path, status, elapsed_ms);
    } else if response.status().is_client_error() {
        tracing::warn!("{} {} -> {} ({} ms)", method, path, status, elapsed_ms);
    } else {
        tracing::info!("{} {} -> {} ({} ms)", method, path, status, elapsed_ms);
    }

    response
}

const PUBLIC_PREFIX: &str = "/api/public/cash_register/";

fn mask_public_token(path: &str) -> String {
    match path.strip_prefix(PUBLIC_PREFIX) {
        Some(rest) => {
            let tail = rest.find('/').map(|i| &rest[i..]).unwrap_or("");
            format!("{}***{}", PUBLIC_PREFIX, tail)
        }
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_masked_in_public_paths() {
        assert_eq!(
            mask_public_token("/api/public/cash_register/abcdef0123/pin"),
            "/api/public/cash_register/***/pin"
        );
        assert_eq!(
            mask_public_token("/api/public/cash_register/abcdef0123"),
            "/api/public/cash_register/***"
        );
        assert_eq!(mask_public_token("/api/cash_registers"), "/api/cash_registers");
    }
}
