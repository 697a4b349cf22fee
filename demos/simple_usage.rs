use std::time::Duration;
use tail_reader::{ByteStream, TailOptions, TailingFile, synchronized};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let dir = std::env::temp_dir().join("tail-reader-demo");
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join("growing.log");

    // A writer that appends a few lines, then closes the file.
    let mut writer = tokio::fs::File::create(&path).await?;
    let producer = tokio::spawn(async move {
        for i in 1..=3 {
            tokio::time::sleep(Duration::from_millis(300)).await;
            writer.write_all(format!("line {}\n", i).as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let options = TailOptions::default().with_read_timeout(Some(Duration::from_secs(5)));
    let mut shared = synchronized(TailingFile::open_with(&path, options).await?);

    println!("Following {}...", path.display());

    let cancel = CancellationToken::new();
    let mut buf = [0u8; 256];
    loop {
        let len = buf.len();
        let read = shared.read_async(&mut buf, 0, len, &cancel).await?;
        if read == 0 {
            break;
        }
        print!("{}", String::from_utf8_lossy(&buf[..read]));
    }

    producer.await??;
    shared.close_async().await?;
    println!("Writer closed, end of stream.");

    Ok(())
}
