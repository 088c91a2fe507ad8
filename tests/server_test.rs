// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// 向运行中的演示服务器发送原始报文并读取响应
async fn send_request(request: &str, port: u16) -> Result<String, String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .map_err(|e| e.to_string())?;

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| e.to_string())?;

    let mut buffer = vec![0; 8192];
    // 设置硬超时限制，防止测试用例因服务器挂起而永久阻塞
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buffer))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;

    Ok(String::from_utf8_lossy(&buffer[..n]).to_string())
}

fn parse_response(response: &str) -> (u16, Vec<(String, String)>, String) {
    let lines: Vec<&str> = response.split("\r\n").collect();

    // 解析状态行
    let status_code = lines[0]
        .split_whitespace()
        .nth(1)
        .unwrap_or("0")
        .parse::<u16>()
        .unwrap_or(0);

    // 解析头部
    let mut headers = Vec::new();
    let mut i = 1;
    while i < lines.len() && !lines[i].is_empty() {
        if let Some((key, value)) = lines[i].split_once(": ") {
            headers.push((key.to_string(), value.to_string()));
        }
        i += 1;
    }

    // 解析主体
    let body = if i + 1 < lines.len() {
        lines[i + 1..].join("\r\n")
    } else {
        String::new()
    };

    (status_code, headers, body)
}

#[cfg(test)]
mod server_tests {
    //! 这些测试需要先通过 `cargo run` 启动演示服务器（默认端口 7878）。

    use super::*;
    use std::collections::HashMap;

    const PORT: u16 = 7878;

    #[tokio::test]
    #[ignore] // 需要服务器运行时才能通过
    async fn test_home_page() {
        let request = "GET / HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let response = send_request(request, PORT).await.unwrap();
        let (status_code, headers, body) = parse_response(&response);

        assert_eq!(status_code, 200);
        let header_map: HashMap<String, String> = headers.into_iter().collect();
        assert!(header_map.contains_key("Content-Length"));
        assert_eq!(header_map.get("Server").map(String::as_str), Some("apricot"));
        assert!(body.contains("Apricot"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_hello_route() {
        let request = "GET /hello/World HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let response = send_request(request, PORT).await.unwrap();
        let (status_code, _headers, body) = parse_response(&response);

        assert_eq!(status_code, 200);
        assert_eq!(body, "Hello World");
    }

    #[tokio::test]
    #[ignore]
    async fn test_head_request_has_no_body() {
        let request = "HEAD /hello/World HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let response = send_request(request, PORT).await.unwrap();
        let (status_code, headers, body) = parse_response(&response);

        assert_eq!(status_code, 200);
        assert!(body.is_empty());
        let header_map: HashMap<String, String> = headers.into_iter().collect();
        assert!(header_map.contains_key("Content-Length"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_prefixed_api_route() {
        let request = "GET /api/ping HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let response = send_request(request, PORT).await.unwrap();
        let (status_code, _headers, body) = parse_response(&response);

        assert_eq!(status_code, 200);
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    #[ignore]
    async fn test_404_not_found() {
        let request = "GET /nonexistent-route-12345 HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let response = send_request(request, PORT).await.unwrap();
        let (status_code, _headers, body) = parse_response(&response);

        assert_eq!(status_code, 404);
        assert!(body.contains("404"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_rest_method_override() {
        let form = "_method=DELETE";
        let request = format!(
            "POST /posts/3 HTTP/1.1\r\nHost: localhost:7878\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            form.len(),
            form
        );
        let response = send_request(&request, PORT).await.unwrap();
        let (status_code, _headers, body) = parse_response(&response);

        assert_eq!(status_code, 200);
        assert!(body.contains("deleted post 3"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_malformed_request_is_rejected() {
        let request = "BREW /pot HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";
        let response = send_request(request, PORT).await.unwrap();
        let (status_code, _headers, _body) = parse_response(&response);

        assert_eq!(status_code, 400);
    }

    #[tokio::test]
    #[ignore]
    async fn test_concurrent_requests() {
        let mut handles = vec![];

        for i in 0..10 {
            let handle = tokio::spawn(async move {
                let request = format!("GET /hello/user{} HTTP/1.1\r\nHost: localhost:7878\r\n\r\n", i);
                send_request(&request, PORT).await
            });
            handles.push(handle);
        }

        let mut success_count = 0;
        for handle in handles {
            if let Ok(Ok(_response)) = handle.await {
                success_count += 1;
            }
        }

        assert!(
            success_count >= 5,
            "并发请求成功率太低: {}/10",
            success_count
        );
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_parse_response_basic() {
        let response = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nServer: apricot\r\n\r\nHello";
        let (status_code, headers, body) = parse_response(response);

        assert_eq!(status_code, 200);
        assert_eq!(headers.len(), 2);
        assert_eq!(body, "Hello");
    }

    #[test]
    fn test_parse_response_404() {
        let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
        let (status_code, headers, body) = parse_response(response);

        assert_eq!(status_code, 404);
        assert_eq!(headers.len(), 1);
        assert!(body.is_empty());
    }
}
