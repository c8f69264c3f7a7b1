use axum::response::Html;

const GALLERY_HTML: &str = include_str!("../templates/gallery.html");

pub async fn gallery_page() -> Html<&'static str> {
    Html(GALLERY_HTML)
}
