use httputils::{Client, FileSource, KeyedFileGroup, Multipart, Params};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let client = Client::new()?;

    println!("=== Multipart upload ===");

    let png: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    let multipart = Multipart::new()
        .group(KeyedFileGroup::new(
            "photos",
            vec![
                FileSource::from_bytes("front.png", png),
                FileSource::from_bytes("back \"v2\".png", png),
            ],
        ))
        .file(
            "notes",
            FileSource::from_bytes("notes.txt", "shipped in one box").with_mime_type("text/plain"),
        )
        .fields(Params::new().with("order", "1042").with_opt("coupon", None::<String>));

    let query = Params::new().with("source", "demo");
    let response = client
        .post_multipart("https://httpbin.org/post", multipart, Some(&query), None)
        .await?;
    println!("Status: {}", response.status());
    let body = response.string_body();
    println!("Response: {}", &body[..body.len().min(500)]);

    println!("\n=== Upload a file from disk ===");

    let path = std::env::temp_dir().join("httputils-demo.txt");
    tokio::fs::write(&path, "hello from disk").await?;
    let multipart = Multipart::new().file("upload", FileSource::from_path(&path));
    let response = client
        .post_multipart("https://httpbin.org/post", multipart, None, None)
        .await?;
    println!("Status: {}", response.status());
    println!("Content-Type: {}", response.mime_type());

    Ok(())
}
