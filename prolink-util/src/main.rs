use anyhow::Result;

use prolink::{Config, Prolink};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut prolink = Prolink::join(Config {
        name: "prolink-util".to_string(),
        device_num: 4,
        ..Default::default()
    })
    .await?;

    println!("joined network");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            res = prolink.next() => {
                match res {
                    Ok(msg) => println!("msg: {:?}", msg),
                    Err(e) => {
                        eprintln!("link error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    println!("terminating");
    prolink.terminate().await;

    Ok(())
}
