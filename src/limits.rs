/// Max length of a resource name.
pub const MAX_NAME_LEN: usize = 36;

/// Max length of a resource type tag.
pub const MAX_RESOURCE_TYPE_LEN: usize = 36;

/// Max length of an allocation type.
pub const MAX_ALLOCATION_TYPE_LEN: usize = 20;

/// Max length of an allocation description.
pub const MAX_DESCRIPTION_LEN: usize = 100;

/// Max size of an allocation payload, serialized as JSON.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Max encoded size of one WAL entry. Larger length prefixes are read as a torn tail.
pub const MAX_EVENT_BYTES: usize = MAX_PAYLOAD_BYTES + 16 * 1024;

/// Max resources held by one store.
pub const MAX_RESOURCES: usize = 100_000;

/// Max live allocations on a single resource.
pub const MAX_ALLOCATIONS_PER_RESOURCE: usize = 10_000;

/// Max length of a registry route prefix.
pub const MAX_PREFIX_LEN: usize = 64;
