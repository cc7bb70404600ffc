use httputils::{Client, JsonCodec, Params};
use serde::{Deserialize, Serialize};
use std::error::Error;

#[derive(Debug, Serialize)]
struct Offer {
    id: u32,
    title: String,
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Echo {
    json: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let client = Client::builder().user_agent("httputils-demo/0.1")?.build()?;

    println!("=== POST JSON text ===");

    let headers = Params::new().with("Accept", "application/json");
    let response = client
        .post_json("https://httpbin.org/post", r#"{"name":"httputils"}"#, Some(&headers))
        .await?;
    println!("Status: {}", response.status());
    println!("Charset: {}", response.charset().name());
    let body = response.string_body();
    println!("Response: {}", &body[..body.len().min(300)]);

    println!("\n=== POST a serialized object ===");

    let offer = Offer {
        id: 7,
        title: "Senior Engineer".to_string(),
        remark: None,
    };
    let codec = JsonCodec::new().omit_nulls(true).root_value(true);
    let response = client
        .post_json_object("https://httpbin.org/post", &offer, &codec, None)
        .await?;
    let echo: Echo = response.decode_json(&JsonCodec::new())?;
    println!("Server saw: {}", echo.json);

    println!("\n=== Non-success status ===");

    let response = client.get("https://httpbin.org/status/404", None, None).await?;
    println!("Status: {} (success: {})", response.status(), response.is_success());

    Ok(())
}
