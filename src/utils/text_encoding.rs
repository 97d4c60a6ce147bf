// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use tracing::debug;

/// 将响应字节解码为UTF-8文本
///
/// 优先使用 Content-Type 声明的 charset，其次直接按UTF-8解析，最后使用 chardetng 检测
pub fn decode_body(bytes: &[u8], content_type: &str) -> String {
    if let Some(encoding) = declared_charset(content_type) {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return text.into_owned();
        }
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    debug!("Detected body encoding {}", encoding.name());
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn declared_charset(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("charset="))
        .find_map(|label| Encoding::for_label(label.trim_matches('"').as_bytes()))
}
