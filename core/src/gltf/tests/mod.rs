//! Loader tests built on small inline glTF documents.


/// Three `VEC3` float positions followed by three `u16` indices (44 bytes).
pub(super) const TRIANGLE_BIN_BASE64: &str =
    "AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA=";

/// A 2x2 RGBA8 PNG: red, green, blue, half-transparent white.
pub(super) const CHECKER_PNG_BASE64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAIAAAACCAYAAABytg0kAAAAE0lEQVR4nGP4z8DwHwyBNAg0AABJSQl4KKDbdwAAAABJRU5ErkJggg==";

/// Build a triangle document whose single buffer is referenced by `buffer_uri`.
pub(super) fn triangle_gltf(buffer_uri: &str, image_uri: &str) -> String {
    format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [ {{ "nodes": [0] }} ],
  "nodes": [
    {{ "mesh": 0, "children": [1], "translation": [1.0, 2.0, 3.0] }},
    {{ "name": "empty" }}
  ],
  "meshes": [ {{
    "name": "triangle",
    "primitives": [ {{
      "attributes": {{ "POSITION": 0 }},
      "indices": 1,
      "material": 0
    }} ]
  }} ],
  "materials": [ {{
    "name": "masked",
    "alphaMode": "MASK",
    "doubleSided": true,
    "pbrMetallicRoughness": {{
      "baseColorFactor": [0.5, 0.25, 1.0, 1.0],
      "baseColorTexture": {{ "index": 0 }},
      "metallicFactor": 0.0,
      "roughnessFactor": 0.75
    }}
  }} ],
  "textures": [ {{ "source": 0, "sampler": 0 }} ],
  "samplers": [ {{ "magFilter": 9728, "minFilter": 9987, "wrapS": 33071, "wrapT": 33648 }} ],
  "images": [ {{ "uri": "{image_uri}" }} ],
  "buffers": [ {{ "byteLength": 44, "uri": "{buffer_uri}" }} ],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ]
}}"#
    )
}

/// The triangle document with everything embedded as data URIs.
pub(super) fn embedded_triangle() -> String {
    triangle_gltf(
        &format!("data:application/octet-stream;base64,{TRIANGLE_BIN_BASE64}"),
        &format!("data:image/png;base64,{CHECKER_PNG_BASE64}"),
    )
}
