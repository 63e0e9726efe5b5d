use super::{MapHandle, RenderError};

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

const SCRIPT: &str = r#"
const doc = JSON.parse(document.getElementById('map-data').textContent);
const map = L.map('map').setView([doc.center[1], doc.center[0]], doc.zoom);
L.tileLayer(doc.tileUrl, { maxZoom: 19, attribution: doc.attribution }).addTo(map);
const overlays = {};
for (const layer of doc.layers) {
  const src = layer.source;
  let leafletLayer;
  if (src.type === 'vector') {
    leafletLayer = L.polygon(src.ring.map(([lon, lat]) => [lat, lon]), {
      color: layer.color, fill: false, weight: 2,
    });
  } else {
    const canvas = document.createElement('canvas');
    canvas.width = src.width;
    canvas.height = src.height;
    const ctx = canvas.getContext('2d');
    const pixels = ctx.createImageData(src.width, src.height);
    pixels.data.set(src.rgba);
    ctx.putImageData(pixels, 0, 0);
    const b = src.bounds;
    leafletLayer = L.imageOverlay(canvas.toDataURL(), [[b.south, b.west], [b.north, b.east]], {
      className: 'pixelated',
    });
  }
  leafletLayer.addTo(map);
  overlays[layer.label] = leafletLayer;
}
L.control.layers(null, overlays, { collapsed: false }).addTo(map);
"#;

/// Embeds the map document in a page that draws it with Leaflet.
pub(super) fn render_page(map: &MapHandle) -> Result<String, RenderError> {
    let mut doc = serde_json::to_value(map)?;
    if let Some(object) = doc.as_object_mut() {
        object.insert("tileUrl".into(), map.basemap().tile_url().into());
        object.insert("attribution".into(), map.basemap().attribution().into());
    }
    // A literal "</" would end the script element early.
    let data = serde_json::to_string(&doc)?.replace("</", "<\\/");

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Sentinel-2 composite</title>
<link rel="stylesheet" href="{LEAFLET_CSS}">
<script src="{LEAFLET_JS}"></script>
<style>
html, body, #map {{ height: 100%; margin: 0; }}
.pixelated {{ image-rendering: pixelated; }}
</style>
</head>
<body>
<div id="map"></div>
<script type="application/json" id="map-data">{data}</script>
<script>{SCRIPT}</script>
</body>
</html>
"#
    ))
}
