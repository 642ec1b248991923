//! Interactive documentation pages
//!
//! Each page loads its viewer from a CDN and points it at the JSON document.

use crate::config::DocUi;

/// Render the HTML page for `ui`
pub fn render(ui: DocUi, title: &str, spec_url: &str) -> String {
    let title = escape(title);
    let spec_url = escape(spec_url);
    match ui {
        DocUi::Swagger => format!(
            r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{title} - Swagger UI</title>
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.ui = SwaggerUIBundle({{
      url: "{spec_url}",
      dom_id: "#swagger-ui",
      presets: [SwaggerUIBundle.presets.apis, SwaggerUIBundle.SwaggerUIStandalonePreset],
      layout: "BaseLayout",
      deepLinking: true
    }});
  </script>
</body>
</html>
"##
        ),
        DocUi::Redoc => format!(
            r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{title} - ReDoc</title>
</head>
<body>
  <redoc spec-url="{spec_url}"></redoc>
  <script src="https://cdn.jsdelivr.net/npm/redoc@2/bundles/redoc.standalone.js"></script>
</body>
</html>
"##
        ),
        DocUi::Rapidoc => format!(
            r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{title} - RapiDoc</title>
  <script type="module" src="https://unpkg.com/rapidoc/dist/rapidoc-min.js"></script>
</head>
<body>
  <rapi-doc spec-url="{spec_url}" render-style="read" show-header="false"></rapi-doc>
</body>
</html>
"##
        ),
        DocUi::Elements => format!(
            r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{title} - Elements</title>
  <script src="https://unpkg.com/@stoplight/elements/web-components.min.js"></script>
  <link rel="stylesheet" href="https://unpkg.com/@stoplight/elements/styles.min.css" />
</head>
<body>
  <elements-api apiDescriptionUrl="{spec_url}" router="hash" layout="sidebar"></elements-api>
</body>
</html>
"##
        ),
    }
}

fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_page_points_at_the_document() {
        for ui in DocUi::all() {
            let html = render(ui, "Pets", "/docs/openapi.json");
            assert!(html.starts_with("<!DOCTYPE html>"));
            assert!(html.contains("/docs/openapi.json"), "{:?}", ui);
            assert!(html.contains("<title>Pets - "));
        }
    }

    #[test]
    fn test_swagger_mounts_on_its_element() {
        let html = render(DocUi::Swagger, "Pets", "/docs/openapi.json");
        assert!(html.contains(r##"dom_id: "#swagger-ui""##));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_title_is_escaped() {
        let html = render(DocUi::Redoc, "<script>", "/openapi.json");
        assert!(html.contains("&lt;script&gt;"));
    }
}
