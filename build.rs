//! Stamps build metadata for the `bazaar-search` startup banner / 为启动日志写入构建信息

use chrono::Utc;

fn main() {
    let stamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    println!("cargo:rustc-env=BUILD_TIME={}", stamp);

    // debug / release
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=BUILD_PROFILE={}", profile);

    println!("cargo:rerun-if-changed=build.rs");
}
