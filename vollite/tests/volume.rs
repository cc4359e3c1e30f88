//! Integration tests for volume define/erase, children and source images.

use std::path::PathBuf;
use std::sync::Arc;

use proptest::prelude::*;
use vollite::{
    StorageContext, Volume, VolliteError, VolumeFormat, VolumeOptions, VolumeStatus,
};
use vollite_test_utils::{FakeFiles, PoolCall, RecordingPool, test_context};

const ADMIN_ISO: &str = "/tmp/admin.iso";
const ADMIN_ISO_SIZE: u64 = 5 * 1024 * 1024 * 1024;

// ============================================================================
// TEST FIXTURES
// ============================================================================

struct TestContext {
    context: Arc<StorageContext>,
    pool: RecordingPool,
}

impl TestContext {
    fn new() -> Self {
        let files = FakeFiles::new().with_image(ADMIN_ISO, ADMIN_ISO_SIZE, b"image_data");
        let (context, pool) = test_context(&files);
        Self { context, pool }
    }

    fn blank(&self, name: &str, gib: u64) -> Volume {
        self.context
            .add_volume(VolumeOptions::builder(name).capacity(gib).build())
            .unwrap()
    }

    fn from_image(&self, name: &str, image: &str) -> Volume {
        self.context
            .add_volume(VolumeOptions::builder(name).source_image(image).build())
            .unwrap()
    }
}

// ============================================================================
// DEFINE / ERASE
// ============================================================================

#[test]
fn define_erase() {
    let ctx = TestContext::new();
    let mut volume = ctx.blank("test_volume", 512);

    volume.define().unwrap();

    assert_eq!(volume.capacity(), Some(512));
    assert_eq!(volume.get_capacity().unwrap(), 549755813888);
    assert_eq!(
        volume.get_path().unwrap(),
        PathBuf::from("/default-pool/test_env_test_node_test_volume")
    );
    assert_eq!(volume.get_allocation().unwrap(), 549755813888);

    let xml = volume.xml_desc().unwrap();
    assert_eq!(
        xml,
        "<volume type='file'>
  <name>test_env_test_node_test_volume</name>
  <key>/default-pool/test_env_test_node_test_volume</key>
  <source>
  </source>
  <capacity unit='bytes'>549755813888</capacity>
  <allocation unit='bytes'>549755813888</allocation>
  <target>
    <path>/default-pool/test_env_test_node_test_volume</path>
    <format type='qcow2'/>
    <permissions>
      <mode>0644</mode>
      <owner>-1</owner>
      <group>-1</group>
    </permissions>
  </target>
</volume>
"
    );

    volume.erase().unwrap();

    assert!(!volume.exists());
    assert_eq!(volume.status(), VolumeStatus::Erased);
}

#[test]
fn erase_missing_volume_fails() {
    let ctx = TestContext::new();
    let mut volume = ctx.blank("test_volume", 1);

    assert!(volume.erase().unwrap_err().is_not_found());

    volume.define().unwrap();
    volume.erase().unwrap();
    assert!(volume.erase().unwrap_err().is_not_found());
    assert_eq!(ctx.pool.delete_count(), 1);
}

#[test]
fn erased_volume_leaves_same_named_successor_alone() {
    let ctx = TestContext::new();
    let mut first = ctx.blank("test_volume", 1);
    first.define().unwrap();
    first.erase().unwrap();

    let mut second = ctx.blank("test_volume", 1);
    second.define().unwrap();

    assert!(first.erase().unwrap_err().is_not_found());
    assert!(second.exists());
    assert_eq!(second.status(), VolumeStatus::Defined);
    assert_eq!(ctx.pool.delete_count(), 1);
}

#[test]
fn define_twice_fails() {
    let ctx = TestContext::new();
    let mut volume = ctx.blank("test_volume", 1);
    volume.define().unwrap();

    assert!(matches!(
        volume.define(),
        Err(VolliteError::AlreadyDefined(_))
    ));

    // A second entity with the same name collides in the pool
    let mut twin = ctx.blank("test_volume", 1);
    assert!(matches!(twin.define(), Err(VolliteError::AlreadyDefined(_))));
    assert_eq!(twin.status(), VolumeStatus::Undefined);
}

#[test]
fn erase_then_redefine() {
    let ctx = TestContext::new();
    let mut volume = ctx.blank("test_volume", 1);

    volume.define().unwrap();
    volume.erase().unwrap();
    volume.define().unwrap();

    assert!(volume.exists());
    assert_eq!(volume.status(), VolumeStatus::Defined);
    let defines = ctx
        .pool
        .calls()
        .into_iter()
        .filter(|call| matches!(call, PoolCall::Define { .. }))
        .count();
    assert_eq!(defines, 2);
}

#[test]
fn undefined_volume_rejects_queries() {
    let ctx = TestContext::new();
    let volume = ctx.blank("test_volume", 1);

    assert!(!volume.exists());
    assert!(matches!(volume.get_capacity(), Err(VolliteError::NotDefined(_))));
    assert!(matches!(volume.get_allocation(), Err(VolliteError::NotDefined(_))));
    assert!(matches!(volume.get_path(), Err(VolliteError::NotDefined(_))));
    assert!(matches!(volume.get_format(), Err(VolliteError::NotDefined(_))));
    assert!(matches!(volume.upload(ADMIN_ISO), Err(VolliteError::NotDefined(_))));
}

#[test]
fn invalid_sizing_is_rejected() {
    let ctx = TestContext::new();

    let neither = ctx.context.add_volume(VolumeOptions::builder("vol").build());
    assert!(matches!(
        neither,
        Err(VolliteError::InvalidConfiguration(_))
    ));

    let both = ctx.context.add_volume(
        VolumeOptions::builder("vol")
            .capacity(1)
            .source_image(ADMIN_ISO)
            .build(),
    );
    assert!(matches!(both, Err(VolliteError::InvalidConfiguration(_))));
}

// ============================================================================
// CHILD VOLUMES
// ============================================================================

#[test]
fn child() {
    let ctx = TestContext::new();
    let mut volume = ctx.blank("test_volume", 512);

    volume.define().unwrap();

    let mut child = volume.create_child("test_child").unwrap();

    child.define().unwrap();

    assert_eq!(child.capacity(), Some(512));
    assert_eq!(child.get_capacity().unwrap(), 549755813888);
    assert_eq!(
        child.get_path().unwrap(),
        PathBuf::from("/default-pool/test_env_test_node_test_child")
    );
    assert_eq!(child.get_allocation().unwrap(), 549755813888);

    let xml = child.xml_desc().unwrap();

    assert_eq!(
        xml,
        "<volume type='file'>
  <name>test_env_test_node_test_child</name>
  <key>/default-pool/test_env_test_node_test_child</key>
  <source>
  </source>
  <capacity unit='bytes'>549755813888</capacity>
  <allocation unit='bytes'>549755813888</allocation>
  <target>
    <path>/default-pool/test_env_test_node_test_child</path>
    <format type='qcow2'/>
    <permissions>
      <mode>0644</mode>
      <owner>-1</owner>
      <group>-1</group>
    </permissions>
  </target>
  <backingStore>
    <path>/default-pool/test_env_test_node_test_volume</path>
    <format type='qcow2'/>
    <permissions>
      <mode>0644</mode>
      <owner>-1</owner>
      <group>-1</group>
    </permissions>
  </backingStore>
</volume>
"
    );
}

#[test]
fn child_of_undefined_parent_fails() {
    let ctx = TestContext::new();
    let volume = ctx.blank("test_volume", 512);

    assert!(matches!(
        volume.create_child("test_child"),
        Err(VolliteError::NotDefined(_))
    ));
}

#[test]
fn child_survives_parent_entity() {
    let ctx = TestContext::new();
    let mut volume = ctx.blank("test_volume", 8);
    volume.define().unwrap();
    let parent_path = volume.get_path().unwrap();

    let mut child = volume.create_child("test_child").unwrap();
    drop(volume);

    child.define().unwrap();
    let backing = child.backing_store().unwrap();
    assert_eq!(backing.path, parent_path);
    assert_eq!(backing.format, VolumeFormat::Qcow2);
    assert_ne!(child.get_path().unwrap(), parent_path);
}

#[test]
fn child_requires_parent_in_pool() {
    let ctx = TestContext::new();
    let mut volume = ctx.blank("test_volume", 8);
    volume.define().unwrap();

    let mut child = volume.create_child("test_child").unwrap();
    volume.erase().unwrap();

    assert!(child.define().unwrap_err().is_not_found());
    assert_eq!(child.status(), VolumeStatus::Undefined);
}

// ============================================================================
// SOURCE IMAGES
// ============================================================================

#[test]
fn source_image() {
    let ctx = TestContext::new();
    let mut volume = ctx.from_image("test_volume", ADMIN_ISO);

    volume.define().unwrap();

    assert_eq!(volume.capacity(), None);
    assert_eq!(volume.get_capacity().unwrap(), 5368709120);
    assert_eq!(volume.get_format().unwrap(), VolumeFormat::Qcow2);
    assert_eq!(
        volume.get_path().unwrap(),
        PathBuf::from("/default-pool/test_env_test_node_test_volume")
    );
    assert!(volume.exists());

    // Seeded through a single full-length upload, no resize
    assert_eq!(ctx.pool.upload_calls(), vec![(0, 5368709120)]);
    assert!(ctx.pool.resize_calls().is_empty());
}

#[test]
fn missing_source_image_fails() {
    let ctx = TestContext::new();
    let mut volume = ctx.from_image("test_volume", "/tmp/missing.iso");

    assert!(volume.define().unwrap_err().is_not_found());
    assert_eq!(volume.status(), VolumeStatus::Undefined);
    assert!(ctx.pool.calls().is_empty());
}

#[test]
fn failed_seed_rolls_back() {
    let ctx = TestContext::new();
    ctx.pool.fail_upload("stream aborted");
    let mut volume = ctx.from_image("test_volume", ADMIN_ISO);

    assert!(matches!(volume.define(), Err(VolliteError::Transfer(_))));
    assert_eq!(volume.status(), VolumeStatus::Undefined);
    assert!(!volume.exists());
    assert_eq!(ctx.pool.delete_count(), 1);
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn capacity_in_bytes_is_gib_times_2_pow_30(gib in 1u64..=(1 << 20)) {
        let ctx = TestContext::new();
        let mut volume = ctx.blank("test_volume", gib);
        volume.define().unwrap();

        prop_assert_eq!(volume.get_capacity().unwrap(), gib * (1 << 30));
        prop_assert_eq!(volume.capacity(), Some(gib));
    }
}
