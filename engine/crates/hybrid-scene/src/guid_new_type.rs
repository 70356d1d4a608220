use slotmap::new_key_type;

new_key_type! { pub struct MeshHandle; }
new_key_type! { pub struct TextureHandle; }
new_key_type! { pub struct InstanceHandle; }
