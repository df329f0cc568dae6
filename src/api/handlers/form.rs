use axum::response::Html;

/// Static upload form. Pure front-end collaborator; all validation
/// happens server-side in the sanitizer.
pub async fn ticket_form() -> Html<&'static str> {
    Html(include_str!("../../../assets/form.html"))
}
