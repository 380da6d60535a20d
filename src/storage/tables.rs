use redb::TableDefinition;

/// Image records: key -> ImageRecord (msgpack)
pub const IMAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("images");

/// Image payloads: key -> raw bytes
pub const IMAGE_CONTENT: TableDefinition<&str, &[u8]> = TableDefinition::new("image_content");
