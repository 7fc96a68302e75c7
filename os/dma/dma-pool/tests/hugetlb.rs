//! Runs against real huge pages. Needs reserved pages
//! (`echo 8 > /proc/sys/vm/nr_hugepages`) and `CAP_SYS_ADMIN` for the page
//! map, so it is ignored by default:
//!
//! ```sh
//! sudo -E cargo test -p dma-pool --test hugetlb -- --ignored
//! ```

use dma_pool::layout::HUGE_PAGE_SIZE;
use dma_pool::{DmaContext, PhysResolver, PoolConfig};

#[test]
#[ignore = "requires reserved huge pages and CAP_SYS_ADMIN"]
fn hugetlb_pool_is_physically_contiguous_per_page() {
    let ctx = DmaContext::new();
    let pool = ctx
        .create_pool(&PoolConfig::new("hugetlb", 4096, 600).with_alignment(4096))
        .unwrap();
    assert_eq!(pool.huge_page_count(), 2);

    for page in pool.huge_pages() {
        assert_eq!(page.bus().as_u64() % HUGE_PAGE_SIZE, 0);
        // every 4K frame of a huge page follows the first one
        for off in (0..HUGE_PAGE_SIZE).step_by(4096 * 64) {
            let pa = ctx.resolver().virt_to_phys(page.virt() + off).unwrap();
            assert_eq!(pa.as_u64(), page.bus().as_u64() + off);
        }
    }

    let buf = pool.allocate().unwrap();
    assert_eq!(
        ctx.virt_to_bus(buf.virt()).unwrap(),
        pool.resolve_physical(buf.virt()).unwrap()
    );
    pool.free(buf.virt()).unwrap();
}
