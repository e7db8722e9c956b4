//! 文件列表页面渲染。

use crate::registry::FileMetadata;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// 渲染包含上传表单与下载链接的文件列表页面。
pub fn render_file_list(files: &[FileMetadata]) -> String {
    let mut rows = String::new();
    for file in files {
        rows.push_str(&format!(
            "      <tr><td><a href=\"/download/{href}\">{name}</a></td><td>{uploaded}</td></tr>\n",
            href = urlencoding::encode(&file.name),
            name = escape_html(&file.name),
            uploaded = file.uploaded_at.format(TIMESTAMP_FORMAT),
        ));
    }
    if files.is_empty() {
        rows.push_str("      <tr><td colspan=\"2\">No files uploaded yet</td></tr>\n");
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Files</title>
</head>
<body>
  <h1>Files</h1>
  <form method="post" action="/upload" enctype="multipart/form-data">
    <input type="file" name="file" required>
    <button type="submit">Upload</button>
  </form>
  <table>
    <thead>
      <tr><th>Name</th><th>Uploaded</th></tr>
    </thead>
    <tbody>
{rows}    </tbody>
  </table>
</body>
</html>
"#
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
