//! Drive caches and impulse-response queries.
//!
//! A [`DriveCache`] is a caller-owned snapshot of an articulation's tree
//! shape and mass distribution: per-link spatial transforms, the propagated
//! articulated inertias of a tips-to-root sweep, and the root's inverse
//! composite inertia. Queries against the cache never perturb live
//! simulation state, which is what makes it usable for joint drives that
//! ask "what would this impulse do" while the solver owns the real
//! velocities.
//!
//! Spatial quantities use world-aligned frames at each link's center of
//! mass, ordered `[angular; linear]`. The joint subspace of a spherical
//! joint is pure rotation about the joint anchor, so the tips-to-root
//! sweep is the impulse half of an articulated-body factorization with a
//! compliance-derived spring term regularizing each joint-space load.

use nalgebra::{Matrix3, Matrix6, Matrix6x3, Vector3, Vector6};

use super::{Articulation, LinkHandle};
use crate::body::{Body, BodyStore, Velocity};
use crate::error::{Result, SimError};

/// Spatial vector convention: `[angular; linear]` for motion,
/// `[torque; force]` for load.
pub type SpatialVector = Vector6<f64>;

/// Effective mass assigned to locked degrees of freedom so their response
/// degrades to (numerically) zero instead of dividing by zero.
const LOCKED_MASS: f64 = 1.0e12;

#[derive(Debug, Clone)]
struct CacheLink {
    /// Motion transform from the parent's COM frame to this link's.
    xup: Matrix6<f64>,
    /// Joint motion subspace at this link's COM.
    s: Matrix6x3<f64>,
    /// Articulated inertia times the subspace.
    u: Matrix6x3<f64>,
    /// Inverse joint-space load.
    inv_d: Matrix3<f64>,
}

/// Opaque snapshot of an articulation's topology and factorization.
///
/// Built by [`Articulation::create_drive_cache`]; stale once the
/// articulation's topology changes. Staleness is caught by a
/// `debug_assert` on the revision stamp; in release builds keeping the
/// cache fresh is the caller's responsibility.
#[derive(Debug, Clone)]
pub struct DriveCache {
    revision: u64,
    compliance: f64,
    iterations: u32,
    links: Vec<CacheLink>,
    root_inv_inertia: Matrix6<f64>,
}

impl DriveCache {
    /// Topology revision this cache was built against.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of links the cache was sized for.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

impl Articulation {
    /// Build a drive cache from the current link array.
    ///
    /// `compliance` softens the joint-space loads (zero means rigid) and
    /// `iterations` matches the solver iteration count the drives will run
    /// under, spreading the spring term across iterations.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidBodyId`] if a link body is missing from the
    /// store.
    pub fn create_drive_cache(
        &mut self,
        bodies: &BodyStore,
        compliance: f64,
        iterations: u32,
    ) -> Result<DriveCache> {
        self.ensure_capacity();
        let mut cache = DriveCache {
            revision: self.revision,
            compliance,
            iterations,
            links: Vec::new(),
            root_inv_inertia: Matrix6::zeros(),
        };
        self.factorize(bodies, &mut cache)?;
        Ok(cache)
    }

    /// Refresh an existing cache in place against the current poses and
    /// masses. Cheaper than create-and-release when the topology is
    /// unchanged, which is also the only case it is meant for.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidBodyId`] if a link body is missing from the
    /// store.
    pub fn update_drive_cache(&mut self, bodies: &BodyStore, cache: &mut DriveCache) -> Result<()> {
        self.ensure_capacity();
        cache.revision = self.revision;
        self.factorize(bodies, cache)
    }

    /// Give a cache back. Present for API symmetry with creation; the
    /// cache holds no resources beyond its own allocation.
    pub fn release_drive_cache(&self, cache: DriveCache) {
        drop(cache);
    }

    /// Apply a spatial impulse at `link` and add the resulting velocity
    /// change of *every* link to its body.
    ///
    /// The impulse propagates up the parent chain through the cache's
    /// factorization, the root's composite inverse inertia turns it into
    /// root motion, and the velocity deltas sweep back down the tree.
    pub fn apply_impulse(
        &self,
        bodies: &mut BodyStore,
        link: LinkHandle,
        cache: &DriveCache,
        impulse: SpatialVector,
    ) {
        debug_assert_eq!(
            cache.revision, self.revision,
            "drive cache is stale: topology changed since it was built"
        );
        let Some(target) = self.link_index(link) else {
            return;
        };
        let n = self.links.len();
        let za = self.propagate_up(cache, target, impulse);

        // Dense order guarantees each parent's delta exists before its
        // children need it.
        let mut dv = vec![Vector6::zeros(); n];
        dv[0] = -cache.root_inv_inertia * za[0];
        for i in 1..n {
            let entry = &cache.links[i];
            let Some(p) = self.links[i].parent else { continue };
            let through = entry.xup * dv[p];
            let w = entry.inv_d
                * (-entry.s.transpose() * za[i] - entry.u.transpose() * through);
            dv[i] = through + entry.s * w;
        }

        for (i, l) in self.links.iter().enumerate() {
            if let Some(body) = bodies.get_mut(l.body) {
                body.velocity.angular += dv[i].fixed_rows::<3>(0).into_owned();
                body.velocity.linear += dv[i].fixed_rows::<3>(3).into_owned();
            }
        }
    }

    /// Velocity response of `link` to a spatial impulse at `link`, without
    /// touching any body. The downward sweep only needs the links on the
    /// target's root path, walked in root-to-leaf bit order.
    #[must_use]
    pub fn impulse_response(
        &self,
        link: LinkHandle,
        cache: &DriveCache,
        impulse: SpatialVector,
    ) -> Velocity {
        debug_assert_eq!(
            cache.revision, self.revision,
            "drive cache is stale: topology changed since it was built"
        );
        let Some(target) = self.link_index(link) else {
            return Velocity::zero();
        };
        let za = self.propagate_up(cache, target, impulse);

        let mut dv = vec![Vector6::zeros(); self.links.len()];
        let mut bits = self.links[target].path_to_root;
        while bits != 0 {
            let i = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            if i == 0 {
                dv[0] = -cache.root_inv_inertia * za[0];
                continue;
            }
            let entry = &cache.links[i];
            let Some(p) = self.links[i].parent else { continue };
            let through = entry.xup * dv[p];
            let w = entry.inv_d
                * (-entry.s.transpose() * za[i] - entry.u.transpose() * through);
            dv[i] = through + entry.s * w;
        }

        Velocity {
            angular: dv[target].fixed_rows::<3>(0).into_owned(),
            linear: dv[target].fixed_rows::<3>(3).into_owned(),
        }
    }

    /// Upward half of a query: bias impulses from the target link to the
    /// root, each hop projecting out the joint freedom before handing the
    /// remainder to the parent.
    fn propagate_up(
        &self,
        cache: &DriveCache,
        target: usize,
        impulse: SpatialVector,
    ) -> Vec<Vector6<f64>> {
        let mut za = vec![Vector6::zeros(); self.links.len()];
        za[target] = -impulse;
        let mut i = target;
        while let Some(p) = self.links[i].parent {
            let entry = &cache.links[i];
            let projected = za[i] - entry.u * (entry.inv_d * (entry.s.transpose() * za[i]));
            za[p] += entry.xup.transpose() * projected;
            i = p;
        }
        za
    }

    /// Tips-to-root articulated-inertia sweep shared by cache creation and
    /// refresh.
    fn factorize(&self, bodies: &BodyStore, cache: &mut DriveCache) -> Result<()> {
        let n = self.links.len();
        let spring = if cache.compliance > 0.0 {
            (1.0 / cache.compliance) / f64::from(cache.iterations.max(1))
        } else {
            0.0
        };

        let mut inertias = Vec::with_capacity(n);
        let mut entries = Vec::with_capacity(n);
        for link in &self.links {
            let body = bodies
                .get(link.body)
                .ok_or(SimError::InvalidBodyId(link.body.raw()))?;
            inertias.push(spatial_inertia(body));

            let (xup, s) = match link.parent {
                None => (Matrix6::identity(), Matrix6x3::zeros()),
                Some(p) => {
                    let parent_body = self.links[p].body;
                    let parent = bodies
                        .get(parent_body)
                        .ok_or(SimError::InvalidBodyId(parent_body.raw()))?;
                    let c_parent = parent.pose.translation.vector;
                    let c_child = body.pose.translation.vector;
                    // Root path asserts every non-root link has a joint.
                    let anchor = link
                        .joint
                        .map_or(c_child, |j| parent.pose.transform_point(&j.anchor_in_parent).coords);
                    (
                        translation_transform(c_child - c_parent),
                        joint_subspace(anchor - c_child),
                    )
                }
            };
            entries.push(CacheLink {
                xup,
                s,
                u: Matrix6x3::zeros(),
                inv_d: Matrix3::zeros(),
            });
        }

        for i in (1..n).rev() {
            let u = inertias[i] * entries[i].s;
            let d = entries[i].s.transpose() * u + Matrix3::identity() * spring;
            let inv_d = d.try_inverse().unwrap_or_else(Matrix3::zeros);
            let projected = inertias[i] - u * inv_d * u.transpose();
            entries[i].u = u;
            entries[i].inv_d = inv_d;
            if let Some(p) = self.links[i].parent {
                let xup = entries[i].xup;
                inertias[p] += xup.transpose() * projected * xup;
            }
        }

        cache.root_inv_inertia = if n == 0 {
            Matrix6::zeros()
        } else {
            inertias[0].try_inverse().unwrap_or_else(Matrix6::zeros)
        };
        cache.links = entries;
        Ok(())
    }
}

/// Spatial inertia of a body at its COM in a world-aligned frame: the
/// rotated inertia tensor in the angular block, mass in the linear block.
fn spatial_inertia(body: &Body) -> Matrix6<f64> {
    let r = body.pose.rotation.to_rotation_matrix();
    let local = Matrix3::from_diagonal(&Vector3::new(
        mass_or_locked(body.inv_inertia.x),
        mass_or_locked(body.inv_inertia.y),
        mass_or_locked(body.inv_inertia.z),
    ));
    let world = r.matrix() * local * r.matrix().transpose();
    let mass = mass_or_locked(body.inv_mass);

    let mut inertia = Matrix6::zeros();
    inertia.fixed_view_mut::<3, 3>(0, 0).copy_from(&world);
    inertia
        .fixed_view_mut::<3, 3>(3, 3)
        .copy_from(&(Matrix3::identity() * mass));
    inertia
}

fn mass_or_locked(inv: f64) -> f64 {
    if inv == 0.0 {
        LOCKED_MASS
    } else {
        1.0 / inv
    }
}

/// Motion transform shifting a spatial velocity by `r` (from frame origin
/// to a point at offset `r`): angular unchanged, linear gains `ω × r`.
fn translation_transform(r: Vector3<f64>) -> Matrix6<f64> {
    let mut x = Matrix6::identity();
    x.fixed_view_mut::<3, 3>(3, 0).copy_from(&(-skew(r)));
    x
}

/// Spherical-joint motion subspace at a COM offset `d = anchor - com`:
/// rotation about the anchor moves the COM by `ω × (com - anchor)`.
fn joint_subspace(d: Vector3<f64>) -> Matrix6x3<f64> {
    let mut s = Matrix6x3::zeros();
    s.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&Matrix3::identity());
    s.fixed_view_mut::<3, 3>(3, 0).copy_from(&skew(d));
    s
}

fn skew(v: Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::articulation::{ArticulationId, SphericalJoint};
    use crate::body::BodyId;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};

    fn body_at(id: u64, x: f64, inv_mass: f64) -> Body {
        Body::new(
            BodyId::new(id),
            Isometry3::from_parts(Translation3::new(x, 0.0, 0.0), UnitQuaternion::identity()),
            inv_mass,
            Vector3::new(inv_mass, inv_mass, inv_mass),
        )
    }

    fn joint_at(parent_x: f64, child_x: f64) -> SphericalJoint {
        // Anchor halfway between the two COMs.
        let mid = (parent_x + child_x) * 0.5;
        SphericalJoint {
            anchor_in_parent: Point3::new(mid - parent_x, 0.0, 0.0),
            anchor_in_child: Point3::new(mid - child_x, 0.0, 0.0),
        }
    }

    fn linear_impulse(x: f64) -> SpatialVector {
        let mut imp = SpatialVector::zeros();
        imp[3] = x;
        imp
    }

    #[test]
    fn test_single_link_response_is_inverse_inertia() {
        let mut bodies = BodyStore::new();
        bodies.insert(body_at(0, 0.0, 0.5)); // mass 2
        let mut art = Articulation::new(ArticulationId::new(0));
        let root = art
            .add_link(&mut bodies, BodyId::new(0), None, None)
            .unwrap();

        let cache = art.create_drive_cache(&bodies, 0.0, 4).unwrap();
        let response = art.impulse_response(root, &cache, linear_impulse(1.0));
        assert_relative_eq!(response.linear.x, 0.5, epsilon = 1.0e-9);
        assert_relative_eq!(response.angular.norm(), 0.0, epsilon = 1.0e-9);
    }

    #[test]
    fn test_impulse_at_leaf_moves_root() {
        let mut bodies = BodyStore::new();
        bodies.insert(body_at(0, 0.0, 1.0));
        bodies.insert(body_at(1, 1.0, 1.0));
        let mut art = Articulation::new(ArticulationId::new(0));
        let root = art
            .add_link(&mut bodies, BodyId::new(0), None, None)
            .unwrap();
        let leaf = art
            .add_link(&mut bodies, BodyId::new(1), Some(root), Some(joint_at(0.0, 1.0)))
            .unwrap();

        let cache = art.create_drive_cache(&bodies, 0.0, 4).unwrap();
        art.apply_impulse(&mut bodies, leaf, &cache, linear_impulse(1.0));

        let root_v = bodies.get(BodyId::new(0)).unwrap().velocity;
        let leaf_v = bodies.get(BodyId::new(1)).unwrap().velocity;
        // The impulse transmits through the joint: both ends move along x,
        // the struck link faster than the root.
        assert!(leaf_v.linear.x > 0.0);
        assert!(root_v.linear.x > 0.0);
        assert!(leaf_v.linear.x >= root_v.linear.x);
    }

    #[test]
    fn test_apply_matches_response_for_queried_link() {
        let mut bodies = BodyStore::new();
        bodies.insert(body_at(0, 0.0, 1.0));
        bodies.insert(body_at(1, 1.0, 1.0));
        let mut art = Articulation::new(ArticulationId::new(0));
        let root = art
            .add_link(&mut bodies, BodyId::new(0), None, None)
            .unwrap();
        let leaf = art
            .add_link(&mut bodies, BodyId::new(1), Some(root), Some(joint_at(0.0, 1.0)))
            .unwrap();

        let cache = art.create_drive_cache(&bodies, 0.0, 4).unwrap();
        let imp = linear_impulse(2.0);
        let predicted = art.impulse_response(leaf, &cache, imp);
        art.apply_impulse(&mut bodies, leaf, &cache, imp);
        let actual = bodies.get(BodyId::new(1)).unwrap().velocity;
        assert_relative_eq!(actual.linear.x, predicted.linear.x, epsilon = 1.0e-9);
        assert_relative_eq!(actual.angular.y, predicted.angular.y, epsilon = 1.0e-9);
    }

    #[test]
    fn test_compliance_softens_response() {
        let mut bodies = BodyStore::new();
        bodies.insert(body_at(0, 0.0, 1.0));
        bodies.insert(body_at(1, 1.0, 1.0));
        let mut art = Articulation::new(ArticulationId::new(0));
        let root = art
            .add_link(&mut bodies, BodyId::new(0), None, None)
            .unwrap();
        let leaf = art
            .add_link(&mut bodies, BodyId::new(1), Some(root), Some(joint_at(0.0, 1.0)))
            .unwrap();

        // Zero compliance leaves the joint freedom unregularized; a tiny
        // compliance means a very stiff spring that couples the child's
        // mass to the root.
        let free = art.create_drive_cache(&bodies, 0.0, 4).unwrap();
        let stiff = art.create_drive_cache(&bodies, 1.0e-6, 4).unwrap();
        let free_root = art.impulse_response(root, &free, linear_impulse(1.0));
        let stiff_root = art.impulse_response(root, &stiff, linear_impulse(1.0));
        assert!(stiff_root.linear.x <= free_root.linear.x + 1.0e-12);
        assert!(art.impulse_response(leaf, &stiff, linear_impulse(1.0)).linear.x > 0.0);
    }

    #[test]
    #[should_panic(expected = "drive cache is stale")]
    fn test_stale_cache_asserts_in_debug() {
        let mut bodies = BodyStore::new();
        bodies.insert(body_at(0, 0.0, 1.0));
        bodies.insert(body_at(1, 1.0, 1.0));
        let mut art = Articulation::new(ArticulationId::new(0));
        let root = art
            .add_link(&mut bodies, BodyId::new(0), None, None)
            .unwrap();
        let cache = art.create_drive_cache(&bodies, 0.0, 4).unwrap();

        // Topology changes after the snapshot.
        art.add_link(&mut bodies, BodyId::new(1), Some(root), Some(joint_at(0.0, 1.0)))
            .unwrap();
        let _ = art.impulse_response(root, &cache, linear_impulse(1.0));
    }

    #[test]
    fn test_update_refreshes_revision() {
        let mut bodies = BodyStore::new();
        bodies.insert(body_at(0, 0.0, 1.0));
        let mut art = Articulation::new(ArticulationId::new(0));
        let root = art
            .add_link(&mut bodies, BodyId::new(0), None, None)
            .unwrap();
        let mut cache = art.create_drive_cache(&bodies, 0.0, 4).unwrap();

        // Body moved; refresh picks up the new pose without a rebuild.
        bodies.get_mut(BodyId::new(0)).unwrap().pose =
            Isometry3::translation(0.0, 0.0, 3.0);
        art.update_drive_cache(&bodies, &mut cache).unwrap();
        assert_eq!(cache.revision(), art.revision());
        let response = art.impulse_response(root, &cache, linear_impulse(1.0));
        assert_relative_eq!(response.linear.x, 1.0, epsilon = 1.0e-9);
        art.release_drive_cache(cache);
    }
}
