use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<img\b([^>]*?)\s*(/?)>").expect("静态正则"));
/// 属性名，连同可选的值一起吞掉，引号里的 `loading=` 不算属性
static ATTR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)([^\s"'=/>]+)(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]*))?"#)
        .expect("静态正则")
});

/// 图片默认延迟加载、异步解码；页面显式设置的属性保持不变
const IMG_DEFAULTS: [(&str, &str); 2] = [("loading", "lazy"), ("decoding", "async")];

/// 页面写盘前的 HTML 后处理
pub fn apply(html: String) -> String {
    IMG_TAG.replace_all(&html, rewrite_img).into_owned()
}

fn rewrite_img(caps: &Captures<'_>) -> String {
    let mut attrs = caps[1].to_string();
    let present: HashSet<String> = ATTR_NAME
        .captures_iter(&attrs)
        .map(|c| c[1].to_ascii_lowercase())
        .collect();
    for (name, value) in IMG_DEFAULTS {
        if !present.contains(name) {
            attrs.push_str(&format!(" {name}=\"{value}\""));
        }
    }
    let close = if caps[2].is_empty() { "" } else { " /" };
    format!("<img{attrs}{close}>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_missing_image_attributes() {
        let html = r#"<p><img src="a.png"><img loading="eager" src="b.png" /></p>"#.to_string();
        assert_eq!(
            apply(html),
            concat!(
                r#"<p><img src="a.png" loading="lazy" decoding="async">"#,
                r#"<img loading="eager" src="b.png" decoding="async" /></p>"#
            )
        );
    }

    #[test]
    fn prefixed_attribute_is_not_the_real_one() {
        let html = r#"<img data-loading="x" alt="loading=eager" src="c.png">"#.to_string();
        assert_eq!(
            apply(html),
            r#"<img data-loading="x" alt="loading=eager" src="c.png" loading="lazy" decoding="async">"#
        );
    }

    #[test]
    fn attribute_names_are_case_insensitive() {
        let html = r#"<img LOADING="eager" Decoding="sync" src="d.png">"#.to_string();
        assert_eq!(apply(html.clone()), html);
    }

    #[test]
    fn leaves_other_markup_alone() {
        let html = "<p>image-free <imgx></p>".to_string();
        assert_eq!(apply(html.clone()), html);
    }
}
