macro_rules! stype {
    (atomic u64) => {
        std::sync::atomic::AtomicU64
    };
    (u64) => {
        u64
    };
}

// Counters only ever grow through their generated adder, gauges are stored directly.
macro_rules! gen_stats {
    ($atomic_name:ident $snapshot_name:ident, counters: [$($stat_name:ident $stat_ty:tt),*], gauges: [$($gauge_name:ident $gauge_ty:tt),*]) => {
        #[derive(Debug, Default)]
        pub struct $atomic_name {
            $(
                pub $stat_name: stype!(atomic $stat_ty),
            )*

            $(
                pub $gauge_name: stype!(atomic $gauge_ty),
            )*
        }

        impl $atomic_name {
            pub fn snapshot(&self) -> $snapshot_name {
                $snapshot_name {
                    $(
                        $stat_name: self.$stat_name.load(std::sync::atomic::Ordering::Relaxed),
                    )*

                    $(
                        $gauge_name: self.$gauge_name.load(std::sync::atomic::Ordering::Relaxed),
                    )*
                }
            }

            pub fn reset(&self) {
                $(
                    self.$stat_name.store(0, std::sync::atomic::Ordering::Relaxed);
                )*
                $(
                    self.$gauge_name.store(0, std::sync::atomic::Ordering::Relaxed);
                )*
            }

            $(
                pub fn $stat_name(&self, value: $stat_ty) {
                    self.$stat_name.fetch_add(value, std::sync::atomic::Ordering::Relaxed);
                }
            )*
        }

        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
        pub struct $snapshot_name {
            $(
                pub $stat_name: stype!($stat_ty),
            )*

            $(
                pub $gauge_name: stype!($gauge_ty),
            )*
        }
    };
}
