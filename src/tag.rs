//! Dense tags for polymorphic implementations.
//!
//! Every family (surfaces, lights, one per texture category) maps an
//! implementation type name to a small integer. Kernels branch on that
//! integer instead of calling through a vtable, so the table also decides
//! how a call is dispatched: directly when only one implementation exists,
//! through a bounded switch otherwise.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::handle::{LIGHT_TAG_MASK, SURFACE_TAG_MASK, TEXTURE_TAG_MASK};
use crate::util::{Error, Result};

/// Polymorphic family a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagFamily {
    Surface,
    Light,
    GenericTexture,
    ColorTexture,
    IlluminantTexture,
}

impl TagFamily {
    /// Largest tag value the family's bit field can hold.
    pub const fn mask(self) -> u32 {
        match self {
            TagFamily::Surface => SURFACE_TAG_MASK,
            TagFamily::Light => LIGHT_TAG_MASK,
            TagFamily::GenericTexture | TagFamily::ColorTexture | TagFamily::IlluminantTexture => {
                TEXTURE_TAG_MASK
            }
        }
    }

    /// Texture families tolerate a missing case and yield a zero value.
    pub const fn is_texture(self) -> bool {
        !matches!(self, TagFamily::Surface | TagFamily::Light)
    }

    /// Lowercase name used in messages.
    pub const fn name(self) -> &'static str {
        match self {
            TagFamily::Surface => "surface",
            TagFamily::Light => "light",
            TagFamily::GenericTexture => "generic texture",
            TagFamily::ColorTexture => "color texture",
            TagFamily::IlluminantTexture => "illuminant texture",
        }
    }
}

impl fmt::Display for TagFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a switch does with a tag it has no case for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultCase {
    /// Reaching the default is an error.
    Unreachable,
    /// The default yields a zero value.
    Passthrough,
}

/// Shape of the dispatch code for a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPlan {
    /// No implementation registered.
    Empty,
    /// One implementation, called without branching.
    Direct,
    /// One case per implementation plus a default.
    Switch { cases: usize, default: DefaultCase },
}

/// Append-only `impl_type -> tag` table with the implementation per tag.
pub struct TagTable<T: ?Sized> {
    family: TagFamily,
    tags: HashMap<String, u32>,
    interfaces: Vec<Arc<T>>,
    lookups: usize,
}

impl<T: ?Sized> TagTable<T> {
    /// Empty table for `family`.
    pub fn new(family: TagFamily) -> Self {
        Self {
            family,
            tags: HashMap::new(),
            interfaces: Vec::new(),
            lookups: 0,
        }
    }

    /// Family this table serves.
    pub fn family(&self) -> TagFamily {
        self.family
    }

    /// Tag of `impl_type`, registering `interface` if the type is new.
    ///
    /// The first object seen for a type becomes the implementation that
    /// decodes every instance carrying that tag.
    pub fn assign(&mut self, impl_type: &str, interface: &Arc<T>) -> Result<u32> {
        self.lookups += 1;
        if let Some(&tag) = self.tags.get(impl_type) {
            return Ok(tag);
        }
        let tag = self.interfaces.len() as u32;
        let mask = self.family.mask();
        if tag > mask {
            return Err(Error::TooManyTags {
                family: self.family,
                mask,
            });
        }
        self.tags.insert(impl_type.to_owned(), tag);
        self.interfaces.push(interface.clone());
        tracing::debug!(family = %self.family, impl_type, tag, "assigned tag");
        Ok(tag)
    }

    /// Tag previously assigned to `impl_type`.
    pub fn tag_of(&self, impl_type: &str) -> Option<u32> {
        self.tags.get(impl_type).copied()
    }

    /// Implementation registered for `tag`.
    pub fn get(&self, tag: u32) -> Result<&Arc<T>> {
        self.interfaces.get(tag as usize).ok_or(Error::InvalidTag {
            family: self.family,
            tag,
            count: self.interfaces.len(),
        })
    }

    /// Number of registered implementations.
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    /// True if nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Implementations in tag order.
    pub fn interfaces(&self) -> &[Arc<T>] {
        &self.interfaces
    }

    /// Number of [`assign`](Self::assign) calls so far.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Dispatch shape for the current registrations.
    pub fn plan(&self) -> DispatchPlan {
        match self.interfaces.len() {
            0 => DispatchPlan::Empty,
            1 => DispatchPlan::Direct,
            n => DispatchPlan::Switch {
                cases: n,
                default: if self.family.is_texture() && n == 2 {
                    DefaultCase::Passthrough
                } else {
                    DefaultCase::Unreachable
                },
            },
        }
    }

    /// Run `f` on the implementation selected by `tag` following
    /// [`plan`](Self::plan).
    ///
    /// A direct plan ignores `tag`. Zero-valued results come from
    /// passthrough defaults and from empty texture families.
    pub fn dispatch<R: Default>(&self, tag: u32, f: impl FnOnce(&Arc<T>) -> Result<R>) -> Result<R> {
        match self.plan() {
            DispatchPlan::Empty if self.family.is_texture() => Ok(R::default()),
            DispatchPlan::Empty => Err(Error::InvalidTag {
                family: self.family,
                tag,
                count: 0,
            }),
            DispatchPlan::Direct => f(&self.interfaces[0]),
            DispatchPlan::Switch { cases, default } => {
                if (tag as usize) < cases {
                    return f(&self.interfaces[tag as usize]);
                }
                match default {
                    DefaultCase::Passthrough => Ok(R::default()),
                    DefaultCase::Unreachable => Err(Error::UnreachableTag {
                        family: self.family,
                        tag,
                    }),
                }
            }
        }
    }
}

impl<T: ?Sized> fmt::Debug for TagTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagTable")
            .field("family", &self.family)
            .field("len", &self.interfaces.len())
            .field("lookups", &self.lookups)
            .finish()
    }
}
