use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize, de::IntoDeserializer};

use crate::zotero_api::types::UsageError;

/// The kinds of resources a request can address.
///
/// Declaration order is the canonical nesting order used to build URL paths,
/// so a [`ResourceDescriptor`] always renders `library → collections → items → ...`
/// no matter in which order its segments were added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Library,
    Collections,
    Items,
    Searches,
    Top,
    Trash,
    Children,
    Tags,
    ItemTypes,
    ItemFields,
    CreatorFields,
    ItemTypeFields,
    ItemTypeCreatorTypes,
    Template,
}

impl ResourceKind {
    /// Wire name of the kind, e.g. `itemTypeFields`.
    pub fn name(self) -> &'static str {
        serde_variant::to_variant_name(&self).unwrap_or_default()
    }

    /// Library independent schema resources, served from fixed top-level paths.
    pub fn is_meta(self) -> bool {
        matches!(
            self,
            Self::ItemTypes
                | Self::ItemFields
                | Self::CreatorFields
                | Self::ItemTypeFields
                | Self::ItemTypeCreatorTypes
                | Self::Template
        )
    }

    /// Positional modifiers that only ever appear as a bare path suffix.
    pub fn is_modifier(self) -> bool {
        matches!(self, Self::Top | Self::Trash | Self::Children)
    }

    fn meta_path(self) -> &'static str {
        match self {
            Self::Template => "/items/new",
            Self::ItemTypes => "/itemTypes",
            Self::ItemFields => "/itemFields",
            Self::CreatorFields => "/creatorFields",
            Self::ItemTypeFields => "/itemTypeFields",
            Self::ItemTypeCreatorTypes => "/itemTypeCreatorTypes",
            _ => "",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let deserializer: serde::de::value::StrDeserializer<'_, serde::de::value::Error> =
            s.into_deserializer();
        Self::deserialize(deserializer).map_err(|_| UsageError::UnknownResourceKind(s.into()))
    }
}

/// A user or group library, written `u<id>` / `g<id>` in resource descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LibraryKey {
    User(String),
    Group(String),
}

impl LibraryKey {
    /// Creates a key from a library type name (`user` or `group`) and an id.
    pub fn new(library_type: &str, id: impl Into<String>) -> Result<Self, UsageError> {
        match library_type.to_lowercase().as_str() {
            "user" => Ok(Self::User(id.into())),
            "group" => Ok(Self::Group(id.into())),
            _ => Err(UsageError::UnknownLibraryType(library_type.into())),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Group(id) => id,
        }
    }

    /// The path prefix of every library scoped resource, e.g. `/users/475425`.
    pub fn path(&self) -> String {
        match self {
            Self::User(id) => format!("/users/{}", id),
            Self::Group(id) => format!("/groups/{}", id),
        }
    }
}

impl fmt::Display for LibraryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "u{}", id),
            Self::Group(id) => write!(f, "g{}", id),
        }
    }
}

impl FromStr for LibraryKey {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UsageError::InvalidLibraryKey(s.into());
        let mut chars = s.chars();
        let prefix = chars.next().ok_or_else(invalid)?;
        let id = chars.as_str();
        if id.is_empty() {
            return Err(invalid());
        }
        match prefix {
            'u' => Ok(Self::User(id.into())),
            'g' => Ok(Self::Group(id.into())),
            _ => Err(invalid()),
        }
    }
}

/// How the innermost segment of a descriptor addresses the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceShape {
    /// A single entity, e.g. `/items/X42A7DEE`.
    Single,
    /// A list of entities, e.g. `/items/top`.
    Multiple,
    /// A schema resource such as `/itemTypes`.
    Meta,
    /// Only a library, no sub-resource.
    Bare,
}

/// Ordered set of (kind, optional key) pairs describing the target of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDescriptor {
    segments: BTreeMap<ResourceKind, Option<String>>,
}

impl ResourceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a descriptor rooted at the given library.
    pub fn for_library(library: &LibraryKey) -> Self {
        Self::new().with_library(library)
    }

    pub fn with_library(self, library: &LibraryKey) -> Self {
        self.with(ResourceKind::Library, Some(&library.to_string()))
    }

    /// Adds (or replaces) a segment. `None` addresses the whole collection.
    pub fn with(mut self, kind: ResourceKind, key: Option<&str>) -> Self {
        self.segments.insert(kind, key.map(str::to_owned));
        self
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.segments.contains_key(&kind)
    }

    /// `None` if the kind is absent, `Some(None)` if present without a key.
    pub fn key(&self, kind: ResourceKind) -> Option<Option<&str>> {
        self.segments.get(&kind).map(Option::as_deref)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (ResourceKind, Option<&str>)> {
        self.segments.iter().map(|(kind, key)| (*kind, key.as_deref()))
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn library(&self) -> Result<Option<LibraryKey>, UsageError> {
        match self.key(ResourceKind::Library) {
            Some(Some(key)) => key.parse().map(Some),
            Some(None) => Err(UsageError::InvalidLibraryKey(String::new())),
            None => Ok(None),
        }
    }

    fn meta_kind(&self) -> Option<ResourceKind> {
        self.segments.keys().copied().find(|kind| kind.is_meta())
    }

    /// The deepest non-library segment in nesting order.
    pub fn innermost(&self) -> Option<(ResourceKind, Option<&str>)> {
        self.iter()
            .rev()
            .find(|(kind, _)| *kind != ResourceKind::Library)
    }

    pub fn shape(&self) -> ResourceShape {
        if self.meta_kind().is_some() {
            return ResourceShape::Meta;
        }
        match self.innermost() {
            Some((kind, Some(_))) if !kind.is_modifier() => ResourceShape::Single,
            Some(_) => ResourceShape::Multiple,
            None => ResourceShape::Bare,
        }
    }

    /// Renders the URL path, e.g. `/users/475425/collections/N7W92H48/items/top`.
    pub fn path(&self) -> Result<String, UsageError> {
        if let Some(meta) = self.meta_kind() {
            let ignored: Vec<_> = self
                .iter()
                .filter(|(kind, _)| *kind != ResourceKind::Library && *kind != meta)
                .collect();
            if !ignored.is_empty() {
                log::warn!(
                    "Meta resource '{}' ignores the resource segments {:?}",
                    meta,
                    ignored
                );
            }
            return Ok(meta.meta_path().to_owned());
        }

        let library = self.library()?.ok_or(UsageError::MissingLibrary)?;
        let mut path = library.path();
        for (kind, key) in self.iter().filter(|(kind, _)| *kind != ResourceKind::Library) {
            path.push('/');
            path.push_str(kind.name());
            match key {
                Some(key) if kind.is_modifier() => {
                    log::warn!("Ignoring key '{}' for positional resource '{}'", key, kind);
                }
                Some(key) => {
                    path.push('/');
                    path.push_str(key);
                }
                None => {}
            }
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use ResourceKind::*;

    fn library() -> LibraryKey {
        LibraryKey::User("475425".into())
    }

    #[rstest]
    #[case(&[(Items, None)], "/users/475425/items")]
    #[case(&[(Items, None), (Top, None)], "/users/475425/items/top")]
    #[case(&[(Items, None), (Trash, None)], "/users/475425/items/trash")]
    #[case(&[(Items, Some("X42A7DEE"))], "/users/475425/items/X42A7DEE")]
    #[case(&[(Children, None), (Items, Some("X42A7DEE"))], "/users/475425/items/X42A7DEE/children")]
    #[case(&[(Tags, None), (Items, Some("X42A7DEE"))], "/users/475425/items/X42A7DEE/tags")]
    #[case(&[(Collections, None), (Top, None)], "/users/475425/collections/top")]
    #[case(&[(Items, None), (Collections, Some("N7W92H48"))], "/users/475425/collections/N7W92H48/items")]
    #[case(&[(Top, None), (Items, None), (Collections, Some("N7W92H48"))], "/users/475425/collections/N7W92H48/items/top")]
    #[case(&[(Collections, Some("N7W92H48")), (Tags, None)], "/users/475425/collections/N7W92H48/tags")]
    #[case(&[(Searches, Some("HHF7BB4C"))], "/users/475425/searches/HHF7BB4C")]
    #[case(&[(Tags, Some("Fiction"))], "/users/475425/tags/Fiction")]
    #[case(&[(Items, None), (Top, None), (Tags, None)], "/users/475425/items/top/tags")]
    fn path_follows_nesting_order(
        #[case] segments: &[(ResourceKind, Option<&str>)],
        #[case] expected: &str,
    ) {
        let descriptor = segments
            .iter()
            .fold(ResourceDescriptor::for_library(&library()), |d, (kind, key)| {
                d.with(*kind, *key)
            });
        assert_eq!(descriptor.path().unwrap(), expected);
    }

    #[rstest]
    #[case("u1", "/users/1")]
    #[case("u475425", "/users/475425")]
    #[case("g1", "/groups/1")]
    #[case("g123456", "/groups/123456")]
    fn library_prefix_selects_users_or_groups(#[case] key: &str, #[case] prefix: &str) {
        let library: LibraryKey = key.parse().unwrap();
        let path = ResourceDescriptor::for_library(&library)
            .with(Items, None)
            .path()
            .unwrap();
        assert!(path.starts_with(prefix), "{} should start with {}", path, prefix);
        assert_eq!(library.to_string(), key);
    }

    #[rstest]
    #[case(ItemTypes, "/itemTypes")]
    #[case(ItemFields, "/itemFields")]
    #[case(CreatorFields, "/creatorFields")]
    #[case(ItemTypeFields, "/itemTypeFields")]
    #[case(ItemTypeCreatorTypes, "/itemTypeCreatorTypes")]
    #[case(Template, "/items/new")]
    fn meta_resources_bypass_library(#[case] kind: ResourceKind, #[case] expected: &str) {
        let without_library = ResourceDescriptor::new().with(kind, None);
        assert_eq!(without_library.path().unwrap(), expected);
        assert_eq!(without_library.shape(), ResourceShape::Meta);

        let with_library = ResourceDescriptor::for_library(&library()).with(kind, None);
        assert_eq!(with_library.path().unwrap(), expected);
    }

    #[test]
    fn library_is_required_for_library_resources() {
        let descriptor = ResourceDescriptor::new().with(Items, None);
        assert_matches!(descriptor.path(), Err(UsageError::MissingLibrary));
    }

    #[rstest]
    #[case("")]
    #[case("u")]
    #[case("x123")]
    fn invalid_library_keys_are_rejected(#[case] key: &str) {
        assert_matches!(key.parse::<LibraryKey>(), Err(UsageError::InvalidLibraryKey(k)) if k == key);
    }

    #[rstest]
    #[case("user", "u111")]
    #[case("User", "u111")]
    #[case("group", "g111")]
    fn library_key_from_type_name(#[case] library_type: &str, #[case] expected: &str) {
        let library = LibraryKey::new(library_type, "111").unwrap();
        assert_eq!(library.to_string(), expected);
        assert_eq!(library.id(), "111");
    }

    #[test]
    fn unknown_library_type_is_rejected() {
        assert_matches!(
            LibraryKey::new("team", "111"),
            Err(UsageError::UnknownLibraryType(t)) if t == "team"
        );
    }

    #[rstest]
    #[case("items", Items)]
    #[case("itemTypeCreatorTypes", ItemTypeCreatorTypes)]
    #[case("children", Children)]
    fn resource_kind_round_trips_wire_name(#[case] name: &str, #[case] kind: ResourceKind) {
        assert_eq!(name.parse::<ResourceKind>().unwrap(), kind);
        assert_eq!(kind.name(), name);
    }

    #[test]
    fn unknown_resource_kind_is_rejected() {
        assert_matches!(
            "publications".parse::<ResourceKind>(),
            Err(UsageError::UnknownResourceKind(k)) if k == "publications"
        );
    }

    #[rstest]
    #[case(&[(Items, Some("X42A7DEE"))], ResourceShape::Single)]
    #[case(&[(Items, None)], ResourceShape::Multiple)]
    #[case(&[(Items, Some("X42A7DEE")), (Children, None)], ResourceShape::Multiple)]
    #[case(&[(Items, None), (Top, None)], ResourceShape::Multiple)]
    #[case(&[(Collections, Some("N7W92H48")), (Items, None)], ResourceShape::Multiple)]
    #[case(&[(Collections, Some("N7W92H48"))], ResourceShape::Single)]
    #[case(&[], ResourceShape::Bare)]
    fn shape_follows_innermost_key(
        #[case] segments: &[(ResourceKind, Option<&str>)],
        #[case] expected: ResourceShape,
    ) {
        let descriptor = segments
            .iter()
            .fold(ResourceDescriptor::for_library(&library()), |d, (kind, key)| {
                d.with(*kind, *key)
            });
        assert_eq!(descriptor.shape(), expected);
    }
}
