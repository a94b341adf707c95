pub mod affect;
