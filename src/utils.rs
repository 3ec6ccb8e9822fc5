/// Display and validation helpers / 显示与校验工具函数

const SIZE_UNITS: [&str; 8] = ["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Human-readable size in decimal units / 人类可读的文件大小(十进制单位)
/// 1 -> "1 Byte", 532 -> "532 Bytes", 1234567 -> "1.2 MB"
pub fn format_size(bytes: u64) -> String {
    if bytes == 1 {
        return "1 Byte".to_string();
    }
    if bytes < 1000 {
        return format!("{} Bytes", bytes);
    }

    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, SIZE_UNITS[unit])
}

/// Check for a 64 character hex SHA-256 digest / 检查是否为64位十六进制SHA-256
pub fn is_sha256(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Collapse runs of whitespace into single spaces / 合并连续空白
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
