//! 自动提交表单用到的 HTML 转义

/// 转义属性值与文本中的 `& < > " '`
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// 渲染隐藏字段并在加载后自动提交的表单
pub fn auto_submit_form<'a>(
    id: &str,
    action: &str,
    fields: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> String {
    let inputs: String = fields
        .into_iter()
        .map(|(k, v)| format!(r#"<input type="hidden" name="{}" value="{}"/>"#, escape(k), escape(v)))
        .collect();

    format!(
        r#"<form id="{id}" name="{id}" action="{}" method="POST">{inputs}<input type="submit" value="ok" style="display:none;"/></form><script>document.forms['{id}'].submit();</script>"#,
        escape(action)
    )
}
